pub mod clean;
pub mod format;
pub mod parse;

pub use format::{format_for_analysis, group_thousands, ANALYSIS_BODY_LIMIT};
pub use parse::parse_message;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local};
use digest_core::{CoreError, EmailError, EmailMessage, EmailOptions, EmailSettings};
use tracing::{debug, info, warn};

/// Which newsletters to pull.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailQuery {
    pub allowed_senders: Vec<String>,
    pub hours_back: u32,
    /// Newest messages kept per sender.
    pub max_emails: u32,
}

impl From<&EmailOptions> for EmailQuery {
    fn from(options: &EmailOptions) -> Self {
        Self {
            allowed_senders: options.allowed_senders.clone(),
            hours_back: options.hours_back,
            max_emails: options.max_emails,
        }
    }
}

#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch(&self, query: &EmailQuery) -> Result<Vec<EmailMessage>, CoreError>;
}

#[derive(Clone)]
pub struct EmailCredentials {
    pub address: String,
    pub password: String,
    pub server: String,
    pub port: u16,
}

impl std::fmt::Debug for EmailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailCredentials")
            .field("address", &self.address)
            .field("server", &self.server)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl EmailCredentials {
    /// Per-run overrides win over the process settings.
    pub fn resolve(settings: &EmailSettings, options: &EmailOptions) -> Result<Self, EmailError> {
        let address = options
            .address
            .clone()
            .or_else(|| settings.address.clone())
            .filter(|a| !a.trim().is_empty());
        let password = options
            .password
            .clone()
            .or_else(|| settings.password.clone())
            .filter(|p| !p.is_empty());

        match (address, password) {
            (Some(address), Some(password)) => Ok(Self {
                address,
                password,
                server: settings.imap_server.clone(),
                port: settings.imap_port,
            }),
            _ => Err(EmailError::MissingCredentials),
        }
    }
}

/// IMAP date for the start of the look-back window, e.g. `14-Oct-2024`.
pub fn since_date(now: DateTime<Local>, hours_back: u32) -> String {
    (now - Duration::hours(i64::from(hours_back)))
        .format("%d-%b-%Y")
        .to_string()
}

/// `SEARCH` criteria for one sender. Quotes and backslashes are dropped so
/// the address cannot break out of the quoted string.
pub fn search_criteria(sender: &str, since: &str) -> String {
    let sender: String = sender
        .chars()
        .filter(|c| *c != '"' && *c != '\\')
        .collect();
    format!("FROM \"{}\" SINCE {}", sender.trim(), since)
}

/// Sequence numbers of the newest `max` matches, oldest first.
pub fn newest_ids(ids: impl IntoIterator<Item = u32>, max: u32) -> Vec<u32> {
    let mut ids: Vec<u32> = ids.into_iter().collect();
    ids.sort_unstable();
    let skip = ids.len().saturating_sub(max as usize);
    ids.split_off(skip)
}

/// Blocking IMAP client, driven from a blocking task.
pub struct ImapFetcher {
    credentials: EmailCredentials,
}

impl ImapFetcher {
    pub fn new(credentials: EmailCredentials) -> Self {
        Self { credentials }
    }

    fn fetch_blocking(&self, query: &EmailQuery) -> Result<Vec<EmailMessage>, EmailError> {
        let creds = &self.credentials;
        info!("Connecting to {}:{}", creds.server, creds.port);

        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| EmailError::ConnectionFailed {
                server: creds.server.clone(),
                reason: e.to_string(),
            })?;
        let client = imap::connect((creds.server.as_str(), creds.port), &creds.server, &tls)
            .map_err(|e| EmailError::ConnectionFailed {
                server: creds.server.clone(),
                reason: e.to_string(),
            })?;

        info!("Logging in as {}", creds.address);
        let mut session =
            client
                .login(&creds.address, &creds.password)
                .map_err(|(e, _)| EmailError::LoginFailed {
                    address: creds.address.clone(),
                    reason: e.to_string(),
                })?;

        session.select("INBOX").map_err(protocol_error)?;

        let since = since_date(Local::now(), query.hours_back);
        let mut emails = Vec::new();

        for sender in &query.allowed_senders {
            let criteria = search_criteria(sender, &since);
            debug!("IMAP SEARCH {}", criteria);

            let ids = match session.search(&criteria) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("Search for {} failed: {}", sender, e);
                    continue;
                }
            };
            info!("Found {} emails from {}", ids.len(), sender);

            for id in newest_ids(ids, query.max_emails) {
                let fetched = match session.fetch(id.to_string(), "RFC822") {
                    Ok(fetched) => fetched,
                    Err(e) => {
                        warn!("Error fetching email {}: {}", id, e);
                        continue;
                    }
                };

                for message in fetched.iter() {
                    let Some(raw) = message.body() else {
                        continue;
                    };
                    match parse_message(raw) {
                        Ok(email) => emails.push(email),
                        Err(e) => warn!("Skipping email {}: {}", id, e),
                    }
                }
            }
        }

        if let Err(e) = session.logout() {
            warn!("IMAP logout failed: {}", e);
        }

        info!("Fetched {} emails total", emails.len());
        Ok(emails)
    }
}

fn protocol_error(e: imap::error::Error) -> EmailError {
    EmailError::Protocol {
        reason: e.to_string(),
    }
}

#[async_trait]
impl MailSource for ImapFetcher {
    async fn fetch(&self, query: &EmailQuery) -> Result<Vec<EmailMessage>, CoreError> {
        let fetcher = ImapFetcher::new(self.credentials.clone());
        let query = query.clone();

        let emails = tokio::task::spawn_blocking(move || fetcher.fetch_blocking(&query))
            .await
            .map_err(|e| CoreError::Internal {
                message: format!("Email task failed: {}", e),
            })??;
        Ok(emails)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_since_date() {
        let now = Local.with_ymd_and_hms(2024, 10, 15, 8, 30, 0).unwrap();
        assert_eq!(since_date(now, 24), "14-Oct-2024");
        assert_eq!(since_date(now, 1), "15-Oct-2024");
        assert_eq!(since_date(now, 24 * 31), "14-Sep-2024");
    }

    #[test]
    fn test_search_criteria() {
        assert_eq!(
            search_criteria("news@anthropic.com", "14-Oct-2024"),
            "FROM \"news@anthropic.com\" SINCE 14-Oct-2024"
        );
        assert_eq!(
            search_criteria("evil\" OR ALL \\", "14-Oct-2024"),
            "FROM \"evil OR ALL\" SINCE 14-Oct-2024"
        );
    }

    #[test]
    fn test_newest_ids() {
        assert_eq!(newest_ids(vec![7, 3, 9, 1, 5], 3), vec![5, 7, 9]);
        assert_eq!(newest_ids(vec![2, 1], 20), vec![1, 2]);
        assert!(newest_ids(Vec::new(), 5).is_empty());
    }

    #[test]
    fn test_credentials_resolution() {
        let settings = EmailSettings {
            address: Some("env@example.com".to_string()),
            password: Some("env-pass".to_string()),
            ..EmailSettings::default()
        };

        let creds = EmailCredentials::resolve(&settings, &EmailOptions::default()).unwrap();
        assert_eq!(creds.address, "env@example.com");
        assert_eq!(creds.server, "imap.gmail.com");
        assert_eq!(creds.port, 993);

        let options = EmailOptions {
            address: Some("form@example.com".to_string()),
            password: Some("form-pass".to_string()),
            ..EmailOptions::default()
        };
        let creds = EmailCredentials::resolve(&settings, &options).unwrap();
        assert_eq!(creds.address, "form@example.com");
        assert_eq!(creds.password, "form-pass");
        assert!(!format!("{:?}", creds).contains("form-pass"));

        assert!(matches!(
            EmailCredentials::resolve(&EmailSettings::default(), &EmailOptions::default()),
            Err(EmailError::MissingCredentials)
        ));
    }

    #[test]
    fn test_query_from_options() {
        let options = EmailOptions {
            hours_back: 48,
            max_emails: 3,
            ..EmailOptions::default()
        };
        let query = EmailQuery::from(&options);
        assert_eq!(query.hours_back, 48);
        assert_eq!(query.max_emails, 3);
        assert_eq!(query.allowed_senders, options.allowed_senders);
    }
}
