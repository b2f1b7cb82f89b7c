//! Plain-text rendering of fetched threads, as fed to the model and written
//! to `raw_data.txt`.

use digest_core::{PostThread, RedditComment};
use std::fmt::Write;

pub const POST_CONTENT_LIMIT: usize = 1000;
pub const COMMENT_LIMIT: usize = 500;
pub const REPLY_LIMIT: usize = 300;

const RULE_WIDTH: usize = 80;

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

pub fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

pub fn format_thread(thread: &PostThread) -> String {
    let post = &thread.post;
    let mut out = String::new();

    let _ = writeln!(out, "POST: {}", post.title);
    let _ = writeln!(
        out,
        "r/{} | {} upvotes | {} comments",
        post.subreddit, post.score, post.num_comments
    );
    let _ = writeln!(out, "{}", post.url);

    if let Some(content) = post.content.as_deref().filter(|c| !c.is_empty()) {
        let content = truncate_chars(content, POST_CONTENT_LIMIT).replace('\n', " ");
        let _ = write!(out, "\nPost Content:\n{}\n\n", content);
    }

    let _ = write!(out, "TOP {} COMMENTS\n\n", thread.comments.len());

    for (i, comment) in thread.comments.iter().enumerate() {
        let i = i + 1;
        let _ = writeln!(
            out,
            "{}. ({} points) {}",
            i,
            comment.score,
            truncate_chars(&comment.body, COMMENT_LIMIT)
        );
        write_replies(&mut out, i, &comment.replies);
        out.push('\n');
    }

    out
}

fn write_replies(out: &mut String, parent: usize, replies: &[RedditComment]) {
    if replies.is_empty() {
        return;
    }
    let _ = writeln!(out, "   Replies ({}):", replies.len());
    for (j, reply) in replies.iter().enumerate() {
        let _ = writeln!(
            out,
            "   {}.{}. ({} points) {}",
            parent,
            j + 1,
            reply.score,
            truncate_chars(&reply.body, REPLY_LIMIT)
        );
    }
}

/// Stand-in text for a post whose comments could not be fetched.
pub fn format_thread_error(url: &str, error: &str) -> String {
    format!("Error fetching comments from {}: {}", url, error)
}

pub fn raw_data_header() -> String {
    format!("REDDIT RAW DATA - POSTS AND COMMENTS\n{}\n\n", rule())
}

pub fn raw_data_entry(url: &str, thread_text: &str) -> String {
    format!("LINK: {}\n\n{}\n\n{}\n\n", url, thread_text, rule())
}

#[cfg(test)]
mod tests {
    use super::*;
    use digest_core::RedditPost;

    fn thread(content: Option<&str>, comments: Vec<RedditComment>) -> PostThread {
        PostThread {
            post: RedditPost {
                id: "p1".to_string(),
                title: "New 8B model beats 70B".to_string(),
                content: content.map(str::to_string),
                subreddit: "LocalLLaMA".to_string(),
                url: "https://reddit.com/r/LocalLLaMA/comments/p1/".to_string(),
                score: 512,
                num_comments: 77,
                created_utc: 0,
            },
            comments,
        }
    }

    fn comment(score: i64, body: &str, replies: Vec<RedditComment>) -> RedditComment {
        RedditComment {
            score,
            body: body.to_string(),
            replies,
        }
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_chars("abcdefghijk", 10), "abcdefghij...");
        // Multi-byte characters are counted, not bytes
        assert_eq!(truncate_chars("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_format_thread_layout() {
        let text = format_thread(&thread(
            Some("line one\nline two"),
            vec![
                comment(40, "Great result", vec![comment(12, "Agreed", vec![])]),
                comment(9, "Skeptical", vec![]),
            ],
        ));

        let expected = "POST: New 8B model beats 70B\n\
r/LocalLLaMA | 512 upvotes | 77 comments\n\
https://reddit.com/r/LocalLLaMA/comments/p1/\n\
\n\
Post Content:\n\
line one line two\n\
\n\
TOP 2 COMMENTS\n\
\n\
1. (40 points) Great result\n   Replies (1):\n   1.1. (12 points) Agreed\n\
\n\
2. (9 points) Skeptical\n\
\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_format_thread_truncates_long_text() {
        let long_post = "p".repeat(1200);
        let long_comment = "c".repeat(600);
        let long_reply = "r".repeat(400);

        let text = format_thread(&thread(
            Some(&long_post),
            vec![comment(1, &long_comment, vec![comment(1, &long_reply, vec![])])],
        ));

        assert!(text.contains(&format!("{}...", "p".repeat(POST_CONTENT_LIMIT))));
        assert!(text.contains(&format!("{}...", "c".repeat(COMMENT_LIMIT))));
        assert!(text.contains(&format!("{}...", "r".repeat(REPLY_LIMIT))));
        assert!(!text.contains(&"c".repeat(COMMENT_LIMIT + 1)));
    }

    #[test]
    fn test_post_without_content_or_comments() {
        let text = format_thread(&thread(None, vec![]));
        assert!(!text.contains("Post Content"));
        assert!(text.ends_with("https://reddit.com/r/LocalLLaMA/comments/p1/\nTOP 0 COMMENTS\n\n"));
    }

    #[test]
    fn test_raw_data_blocks() {
        let header = raw_data_header();
        assert!(header.starts_with("REDDIT RAW DATA - POSTS AND COMMENTS\n"));
        assert!(header.contains(&"=".repeat(80)));

        let entry = raw_data_entry("https://reddit.com/x", "body");
        assert_eq!(
            entry,
            format!("LINK: https://reddit.com/x\n\nbody\n\n{}\n\n", "=".repeat(80))
        );
    }
}
