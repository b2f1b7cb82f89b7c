use crate::clean::{clean_text, html_to_text};
use digest_core::{EmailError, EmailMessage};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use tracing::{debug, warn};

pub const NO_SUBJECT: &str = "No Subject";
pub const NO_CONTENT: &str = "Could not extract email content";

/// Decoded text bodies found in a message.
#[derive(Debug, Default)]
struct Bodies {
    plain: Option<String>,
    html: Option<String>,
}

/// Parse one RFC 822 message into subject, sender, date and cleaned body.
pub fn parse_message(raw: &[u8]) -> Result<EmailMessage, EmailError> {
    let mail = mailparse::parse_mail(raw).map_err(|e| EmailError::Parse {
        reason: e.to_string(),
    })?;

    let subject = mail
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());
    let sender = mail.headers.get_first_value("From").unwrap_or_default();
    let date = mail.headers.get_first_value("Date").unwrap_or_default();

    let mut bodies = Bodies::default();
    if mail.subparts.is_empty() {
        collect_single(&mail, &mut bodies);
    } else {
        collect_parts(&mail, &mut bodies);
    }

    let body = match bodies {
        Bodies {
            plain: Some(plain), ..
        } => {
            debug!("Using plain text body for '{}'", subject);
            clean_text(&plain)
        }
        Bodies {
            html: Some(html), ..
        } => {
            debug!("Converting HTML body to text for '{}'", subject);
            html_to_text(&html)
        }
        _ => NO_CONTENT.to_string(),
    };

    Ok(EmailMessage {
        subject,
        sender,
        date,
        body,
    })
}

fn collect_single(mail: &ParsedMail, bodies: &mut Bodies) {
    let Some(text) = decoded_body(mail) else {
        return;
    };
    if mail.ctype.mimetype.eq_ignore_ascii_case("text/html") {
        bodies.html = Some(text);
    } else {
        bodies.plain = Some(text);
    }
}

/// Walk every part depth-first; later parts of a type replace earlier ones.
fn collect_parts(mail: &ParsedMail, bodies: &mut Bodies) {
    for part in &mail.subparts {
        if part.get_content_disposition().disposition == DispositionType::Attachment {
            continue;
        }
        if !part.subparts.is_empty() {
            collect_parts(part, bodies);
            continue;
        }

        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if mimetype != "text/plain" && mimetype != "text/html" {
            continue;
        }
        if let Some(text) = decoded_body(part) {
            if mimetype == "text/plain" {
                bodies.plain = Some(text);
            } else {
                bodies.html = Some(text);
            }
        }
    }
}

fn decoded_body(part: &ParsedMail) -> Option<String> {
    match part.get_body() {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!("Error decoding email part: {}", e);
            None
        }
    }
}
