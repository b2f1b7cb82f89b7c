//! `TelegramNotifier` against a local stand-in for the Bot API.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use digest_core::{CoreError, NotificationError};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use telegram_notifier::{send_formatted, Notifier, ParseMode, TelegramNotifier};

#[derive(Debug, Clone)]
struct Call {
    bot: String,
    method: String,
    body: Vec<u8>,
}

impl Call {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct FakeBot {
    calls: Mutex<Vec<Call>>,
    reject_markdown: bool,
}

async fn bot_method(
    State(bot): State<Arc<FakeBot>>,
    Path((bot_segment, method)): Path<(String, String)>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let call = Call {
        bot: bot_segment,
        method,
        body: body.to_vec(),
    };
    let markdown = call.method == "sendMessage" && call.json()["parse_mode"] == "Markdown";
    bot.calls.lock().unwrap().push(call);

    if bot.reject_markdown && markdown {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "description": "Bad Request: can't parse entities"})),
        );
    }
    (StatusCode::OK, Json(json!({"ok": true, "result": {}})))
}

async fn start(reject_markdown: bool) -> (Arc<FakeBot>, TelegramNotifier) {
    let bot = Arc::new(FakeBot {
        calls: Mutex::new(Vec::new()),
        reject_markdown,
    });
    let app = Router::new()
        .route("/{bot}/{method}", post(bot_method))
        .with_state(bot.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let notifier = TelegramNotifier::new("TOKEN", "42")
        .unwrap()
        .with_base_url(format!("http://{}", addr));
    (bot, notifier)
}

fn calls(bot: &FakeBot) -> Vec<Call> {
    bot.calls.lock().unwrap().clone()
}

#[tokio::test]
async fn test_long_message_is_sent_in_chunks() {
    let (bot, notifier) = start(false).await;
    let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));

    notifier
        .send_message(&text, Some(ParseMode::Markdown))
        .await
        .unwrap();

    let calls = calls(&bot);
    assert_eq!(calls.len(), 2);
    for call in &calls {
        assert_eq!(call.bot, "botTOKEN");
        assert_eq!(call.method, "sendMessage");
        assert_eq!(call.json()["chat_id"], "42");
        assert_eq!(call.json()["parse_mode"], "Markdown");
    }
    assert_eq!(
        calls[0].json()["text"],
        format!("{}\n", "a".repeat(3000)).as_str()
    );
    assert_eq!(calls[1].json()["text"], "b".repeat(3000).as_str());
}

#[tokio::test]
async fn test_plain_message_has_no_parse_mode() {
    let (bot, notifier) = start(false).await;
    notifier.send_message("hello", None).await.unwrap();

    let calls = calls(&bot);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].json().get("parse_mode").is_none());
}

#[tokio::test]
async fn test_formatted_falls_back_to_plain_text() {
    let (bot, notifier) = start(true).await;

    assert!(send_formatted(&notifier, "snake_case [link]").await);

    let calls = calls(&bot);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].json()["text"], "snake\\_case \\[link\\]");
    assert_eq!(calls[1].json()["text"], "snake_case [link]");
}

#[tokio::test]
async fn test_rejection_carries_description() {
    let (_bot, notifier) = start(true).await;
    let err = notifier
        .send_message("x", Some(ParseMode::Markdown))
        .await
        .unwrap_err();

    match err {
        CoreError::Notification(NotificationError::Rejected {
            method,
            description,
        }) => {
            assert_eq!(method, "sendMessage");
            assert_eq!(description, "Bad Request: can't parse entities");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_document_and_audio_uploads() {
    let (bot, notifier) = start(false).await;
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("analysis.txt");
    let audio = dir.path().join("audio.wav");
    std::fs::write(&report, "report body").unwrap();
    std::fs::write(&audio, [0u8; 16]).unwrap();

    notifier.send_document(&report, "📄 Report").await.unwrap();
    notifier
        .send_audio(&audio, "🎙️ Narration", "Digest Audio")
        .await
        .unwrap();

    let calls = calls(&bot);
    assert_eq!(calls.len(), 2);

    assert_eq!(calls[0].method, "sendDocument");
    let document = calls[0].text();
    assert!(document.contains("name=\"chat_id\""));
    assert!(document.contains("name=\"document\"; filename=\"analysis.txt\""));
    assert!(document.contains("report body"));
    assert!(document.contains("📄 Report"));

    assert_eq!(calls[1].method, "sendAudio");
    let upload = calls[1].text();
    assert!(upload.contains("name=\"audio\"; filename=\"audio.wav\""));
    assert!(upload.contains("Digest Audio"));
}

#[tokio::test]
async fn test_missing_attachment_is_not_uploaded() {
    let (bot, notifier) = start(false).await;
    let err = notifier
        .send_document(std::path::Path::new("/nonexistent/analysis.txt"), "caption")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Notification(NotificationError::AttachmentUnreadable { .. })
    ));
    assert!(calls(&bot).is_empty());
}
