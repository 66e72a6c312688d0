//! Sign-in, chart and chat flow through `Session`, plus store selection.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use kundli_chat::config::RemoteConfig;
use kundli_chat::storage::{BackendKind, SqliteBackend, Store};
use kundli_chat::{Advisor, ChatTurn, ConversationId, Error, Profile, Role, Session};
use serde_json::{json, Value};

/// Replies with a fixed outcome
struct ScriptedAdvisor {
    reply: Result<String, String>,
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn answer(&self, _chart: &Value, _question: &str) -> Result<String, String> {
        self.reply.clone()
    }
}

fn advisor(reply: Result<&str, &str>) -> Arc<dyn Advisor> {
    Arc::new(ScriptedAdvisor {
        reply: reply.map(str::to_string).map_err(str::to_string),
    })
}

fn local_store() -> (Store, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let local = SqliteBackend::open(dir.path().join("kundli.db")).unwrap();
    (Store::select(None, local), dir)
}

async fn signed_in(reply: Result<&str, &str>) -> (Session, tempfile::TempDir) {
    let (store, dir) = local_store();
    let mut session = Session::new(store).with_advisor(advisor(reply));
    assert!(session.sign_up("asha", "s3cret").await.unwrap());
    assert!(session.log_in("asha", "s3cret").await.unwrap());
    session.set_chart("Asha", json!({ "ascendant": "Leo" })).unwrap();
    (session, dir)
}

#[tokio::test]
async fn test_first_question_creates_titled_conversation() {
    let (mut session, _dir) = signed_in(Ok("Jupiter favours you this year.")).await;

    let reply = session.ask("Will my career grow after the move abroad?").await.unwrap();
    assert_eq!(reply, ChatTurn::assistant("Jupiter favours you this year."));

    let conversations = session.conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].title, "Will my career grow after the ..");
    assert_eq!(session.current_conversation(), Some(&conversations[0].id));

    let stored = session.store().get_chat_history(&conversations[0].id).await.unwrap();
    assert_eq!(
        stored,
        vec![
            ChatTurn::user("Will my career grow after the move abroad?"),
            ChatTurn::assistant("Jupiter favours you this year."),
        ]
    );
    assert_eq!(session.messages(), stored.as_slice());
}

#[tokio::test]
async fn test_follow_up_questions_reuse_conversation() {
    let (mut session, _dir) = signed_in(Ok("Yes.")).await;
    session.ask("First?").await.unwrap();
    session.ask("Second?").await.unwrap();

    let conversations = session.conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    let stored = session.store().get_chat_history(&conversations[0].id).await.unwrap();
    assert_eq!(stored.len(), 4);
}

#[tokio::test]
async fn test_error_text_reply_is_shown_but_not_saved() {
    let (mut session, _dir) = signed_in(Ok("Error: model overloaded")).await;

    let reply = session.ask("Hello?").await.unwrap();
    assert_eq!(reply.role, Role::Assistant);
    assert_eq!(reply.content, "Error: model overloaded");
    assert_eq!(session.messages().len(), 2);

    let id = session.current_conversation().cloned().unwrap();
    let stored = session.store().get_chat_history(&id).await.unwrap();
    assert_eq!(stored, vec![ChatTurn::user("Hello?")]);
}

#[tokio::test]
async fn test_failed_advisor_becomes_error_reply() {
    let (mut session, _dir) = signed_in(Err("quota exceeded")).await;

    let reply = session.ask("Hello?").await.unwrap();
    assert_eq!(reply.content, "Error: quota exceeded");

    let id = session.current_conversation().cloned().unwrap();
    assert_eq!(session.store().get_chat_history(&id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ask_preconditions() {
    let (store, _dir) = local_store();

    let mut anonymous = Session::new(store.clone()).with_advisor(advisor(Ok("hi")));
    assert!(matches!(anonymous.ask("hi").await, Err(Error::NotSignedIn)));

    store.add_user("ravi", "pw").await.unwrap();
    let mut no_llm = Session::new(store.clone());
    assert!(no_llm.log_in("ravi", "pw").await.unwrap());
    assert!(!no_llm.chat_enabled());
    no_llm.set_chart("Ravi", json!({})).unwrap();
    assert!(matches!(no_llm.ask("hi").await, Err(Error::ChatDisabled)));

    let mut no_chart = Session::new(store.clone()).with_advisor(advisor(Ok("hi")));
    assert!(no_chart.log_in("ravi", "pw").await.unwrap());
    assert!(matches!(no_chart.ask("hi").await, Err(Error::NoChart)));

    // Nothing was written by the rejected turns.
    assert!(store.list_conversations("ravi").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_chart_is_rejected() {
    let (mut session, _dir) = signed_in(Ok("hi")).await;
    let err = session
        .set_chart("Ghost", json!({ "error": "Could not find coordinates" }))
        .unwrap_err();
    assert!(matches!(err, Error::Chart(ref reason) if reason == "Could not find coordinates"));
    assert_eq!(session.subject_name(), Some("Asha"));
}

#[tokio::test]
async fn test_bad_credentials_keep_session_signed_out() {
    let (store, _dir) = local_store();
    let mut session = Session::new(store);
    session.sign_up("asha", "s3cret").await.unwrap();

    assert!(!session.log_in("asha", "nope").await.unwrap());
    assert_eq!(session.username(), None);
    assert!(!session.sign_up("asha", "other").await.unwrap());
}

#[tokio::test]
async fn test_logout_resets_everything() {
    let (mut session, _dir) = signed_in(Ok("ok")).await;
    session
        .save_profile(&Profile::new(
            "Asha",
            NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            "New Delhi, India",
        ))
        .await
        .unwrap();
    session.load_profile("Asha").await.unwrap();
    session.ask("Hi").await.unwrap();

    session.logout();

    assert_eq!(session.username(), None);
    assert_eq!(session.current_conversation(), None);
    assert!(session.messages().is_empty());
    assert!(session.loaded_profile().is_none());
    assert!(session.chart().is_none());
    assert!(session.subject_name().is_none());
    assert!(matches!(session.conversations().await, Err(Error::NotSignedIn)));
}

#[tokio::test]
async fn test_load_profile_by_name() {
    let (mut session, _dir) = signed_in(Ok("ok")).await;
    let mother = Profile::new(
        "Mother",
        NaiveDate::from_ymd_opt(1962, 3, 9).unwrap(),
        NaiveTime::from_hms_opt(5, 45, 0).unwrap(),
        "Pune, India",
    );
    session.save_profile(&mother).await.unwrap();

    assert_eq!(session.load_profile("Mother").await.unwrap(), Some(&mother));
    assert_eq!(session.load_profile("Nobody").await.unwrap(), None);
}

#[tokio::test]
async fn test_resume_latest_and_delete_current() {
    let (mut session, _dir) = signed_in(Ok("ok")).await;
    assert_eq!(session.resume_latest().await.unwrap(), None);

    let older = session.new_conversation().await.unwrap();
    session.ask("older question").await.unwrap();
    let newer = session.new_conversation().await.unwrap();
    assert_ne!(older, newer);
    session.ask("newer question").await.unwrap();

    session.logout();
    assert!(session.log_in("asha", "s3cret").await.unwrap());
    assert_eq!(session.resume_latest().await.unwrap(), Some(newer.clone()));
    assert_eq!(session.messages()[0], ChatTurn::user("newer question"));

    session.delete_current_conversation().await.unwrap();
    assert_eq!(session.current_conversation(), None);
    assert!(session.messages().is_empty());

    let remaining: Vec<ConversationId> =
        session.conversations().await.unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(remaining, vec![older]);
}

#[tokio::test]
async fn test_clear_history_reports_unsupported() {
    let (mut session, _dir) = signed_in(Ok("ok")).await;
    session.ask("keep me").await.unwrap();

    assert!(matches!(session.clear_history().await, Err(Error::Unsupported(_))));
    assert_eq!(session.messages().len(), 2);
}

#[tokio::test]
async fn test_connect_without_remote_uses_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::connect(&dir.path().join("nested/kundli.db"), None).await.unwrap();
    assert_eq!(store.kind(), BackendKind::Sqlite);
    assert!(dir.path().join("nested/kundli.db").exists());
}

#[tokio::test]
async fn test_connect_with_in_memory_remote_uses_surreal() {
    let dir = tempfile::tempdir().unwrap();
    let remote = RemoteConfig::new("mem://");
    let store = Store::connect(&dir.path().join("kundli.db"), Some(&remote)).await.unwrap();
    assert_eq!(store.kind(), BackendKind::Surreal);
}

#[tokio::test]
async fn test_unreachable_remote_falls_back_to_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let mut remote = RemoteConfig::new("wss://127.0.0.1:1");
    remote.connect_timeout_ms = Some(500);

    let store = Store::connect(&dir.path().join("kundli.db"), Some(&remote)).await.unwrap();
    assert_eq!(store.kind(), BackendKind::Sqlite);
    assert!(store.add_user("asha", "pw").await.unwrap());
}

#[tokio::test]
async fn test_plaintext_remote_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let remote = RemoteConfig::new("ws://db.example.com");
    let err = Store::connect(&dir.path().join("kundli.db"), Some(&remote)).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_unsaved_user_turn_is_not_shown() {
    let (mut session, _dir) = signed_in(Ok("never asked")).await;
    // SQLite cannot store a turn against a non-numeric conversation id.
    session.select_conversation(ConversationId::new("not-a-row")).await.unwrap();

    let err = session.ask("Will this be kept?").await.unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
    assert!(session.messages().is_empty());
}
