pub mod output;
pub mod scheduler;
pub mod workflow;

pub use output::RunFolder;
pub use scheduler::{
    next_run_after, BackgroundService, Clock, LastRun, RunStatus, ScheduleState, ScheduleStatus,
    ScheduleStore,
};
pub use workflow::{Adapters, ImapConnector, MailConnector, Pipeline};
