use digest_core::EmailMessage;
use std::fmt::Write;

/// Per-email body limit used when building the analysis corpus.
pub const ANALYSIS_BODY_LIMIT: usize = 10_000;

pub const NO_EMAILS: &str = "No emails found.";

/// Render emails as one markdown-ish block for the model.
pub fn format_for_analysis(emails: &[EmailMessage], max_body_chars: Option<usize>) -> String {
    if emails.is_empty() {
        return NO_EMAILS.to_string();
    }

    let mut out = format!("# AI NEWS EMAILS ({} total)\n\n", emails.len());

    for (i, email) in emails.iter().enumerate() {
        let _ = write!(
            out,
            "## EMAIL {}\nSubject: {}\nFrom: {}\nDate: {}\n\n",
            i + 1,
            email.subject,
            email.sender,
            email.date
        );

        let body = match max_body_chars {
            Some(limit) => truncate_body(&email.body, limit),
            None => email.body.clone(),
        };
        let _ = write!(out, "{}\n\n", body);

        if i + 1 < emails.len() {
            out.push_str("---\n\n");
        }
    }

    out
}

/// Cut `body` to `limit` characters, backing up to the last full stop when
/// one falls within the final fifth, and note the cut.
pub fn truncate_body(body: &str, limit: usize) -> String {
    let original_len = body.chars().count();
    if original_len <= limit {
        return body.to_string();
    }

    let mut cut: String = body.chars().take(limit).collect();
    if let Some(byte_index) = cut.rfind('.') {
        let period_char_index = cut[..byte_index].chars().count();
        if period_char_index as f64 > limit as f64 * 0.8 {
            cut.truncate(byte_index + 1);
        }
    }

    let kept = cut.chars().count();
    format!(
        "{}\n\n[Truncated: {} -> {} chars]",
        cut,
        group_thousands(original_len),
        group_thousands(kept)
    )
}

/// `1234567` as `1,234,567`.
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
