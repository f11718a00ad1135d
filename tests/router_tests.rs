// ABOUTME: Tests for the inbound router: whitelist, forwarding, and slash commands.
// ABOUTME: Drives the full manager + mock backend stack through the router surface.

use porter::testing::MockChannel;
use porter::{BotCommand, Mode, ModelChoice, Router, SessionManager};
use porter_agent::backends::MockBackend;
use porter_agent::PermissionMode;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

fn models() -> Vec<ModelChoice> {
    vec![
        ModelChoice {
            id: "claude-opus-4-6".to_string(),
            name: "Claude Opus 4.6".to_string(),
        },
        ModelChoice {
            id: DEFAULT_MODEL.to_string(),
            name: "Claude Sonnet 4.5".to_string(),
        },
    ]
}

fn router(backend: Arc<MockBackend>) -> (Router, Arc<SessionManager>) {
    let manager = Arc::new(SessionManager::new(
        backend,
        DEFAULT_MODEL,
        std::env::temp_dir(),
    ));
    let router = Router::new(
        Arc::clone(&manager),
        ["alice".to_string(), "bob".to_string()],
        models(),
    );
    (router, manager)
}

fn channel() -> Arc<MockChannel> {
    Arc::new(MockChannel::new("dm-alice"))
}

#[tokio::test]
async fn test_non_whitelisted_user_is_ignored() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    router.handle_message("mallory", channel.clone(), "hi").await.unwrap();
    router
        .handle_command("mallory", channel.clone(), BotCommand::Reset)
        .await
        .unwrap();

    // No session, no reply, no trace of the stranger
    assert_eq!(backend.open_count(), 0);
    assert!(manager.registry().is_empty());
    assert!(channel.messages().is_empty());
}

#[tokio::test]
async fn test_message_creates_session_and_forwards() {
    let backend = Arc::new(MockBackend::new().on_send("hello").respond_text("hi there"));
    let (router, manager) = router(backend.clone());
    let channel = channel();

    router
        .handle_message("alice", channel.clone(), "hello agent")
        .await
        .unwrap();

    assert_eq!(backend.open_count(), 1);
    assert!(manager.registry().get("alice").is_some());
    assert_eq!(channel.typing_count(), 1);

    // The scripted reply flows back through the stream reader
    for _ in 0..200 {
        if channel.messages().iter().any(|m| m == "hi there") {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scripted reply never arrived");
}

#[tokio::test]
async fn test_blank_message_is_ignored() {
    let backend = Arc::new(MockBackend::new());
    let (router, _manager) = router(backend.clone());

    router.handle_message("alice", channel(), "   ").await.unwrap();

    assert_eq!(backend.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_session_creation_reports_failure() {
    let backend = Arc::new(MockBackend::new().with_open_delay(Duration::from_secs(600)));
    let (router, _manager) = router(backend.clone());
    let router = router.with_send_timeout(Duration::from_millis(100));
    let channel = channel();

    router.handle_message("alice", channel.clone(), "hello").await.unwrap();

    assert_eq!(
        channel.messages(),
        vec!["Failed to send message. Try /reset to start a new session.".to_string()]
    );
}

#[tokio::test]
async fn test_reset_destroys_session_and_confirms() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    manager.get_or_create("alice", channel.clone()).await.unwrap();
    router
        .handle_command("alice", channel.clone(), BotCommand::Reset)
        .await
        .unwrap();

    assert!(manager.registry().is_empty());
    assert_eq!(backend.close_count(), 1);
    assert_eq!(
        channel.messages(),
        vec!["Session reset. Your next message will start a new conversation.".to_string()]
    );
}

#[tokio::test]
async fn test_reset_without_session_still_confirms() {
    let backend = Arc::new(MockBackend::new());
    let (router, _manager) = router(backend.clone());
    let channel = channel();

    router
        .handle_command("alice", channel.clone(), BotCommand::Reset)
        .await
        .unwrap();

    assert_eq!(backend.close_count(), 0);
    assert_eq!(
        channel.messages(),
        vec!["Session reset. Your next message will start a new conversation.".to_string()]
    );
}

#[tokio::test]
async fn test_stop_without_session() {
    let backend = Arc::new(MockBackend::new());
    let (router, _manager) = router(backend.clone());
    let channel = channel();

    router
        .handle_command("alice", channel.clone(), BotCommand::Stop)
        .await
        .unwrap();

    assert_eq!(channel.messages(), vec!["No active session to stop.".to_string()]);
}

#[tokio::test]
async fn test_stop_restarts_session_keeping_settings() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    manager
        .recreate("alice", channel.clone(), Some("claude-opus-4-6".to_string()), Some(Mode::AutoEdit))
        .await
        .unwrap();
    router
        .handle_command("alice", channel.clone(), BotCommand::Stop)
        .await
        .unwrap();

    assert_eq!(backend.open_count(), 2);
    assert_eq!(backend.close_count(), 1);
    let record = manager.registry().get("alice").unwrap();
    assert_eq!(record.model, "claude-opus-4-6");
    assert_eq!(record.mode, Mode::AutoEdit);
    assert_eq!(
        channel.messages(),
        vec!["Execution stopped. You can continue sending messages.".to_string()]
    );
}

#[tokio::test]
async fn test_models_menu_marks_current_model() {
    let backend = Arc::new(MockBackend::new());
    let (router, _manager) = router(backend.clone());
    let channel = channel();

    router
        .handle_command("alice", channel.clone(), BotCommand::Models)
        .await
        .unwrap();

    let menu = &channel.messages()[0];
    assert!(menu.contains("Choose a model"));
    assert!(menu.contains("▸ Claude Sonnet 4.5"));
    assert!(menu.contains("Claude Opus 4.6"));
}

#[tokio::test]
async fn test_select_model_restarts_on_new_model() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    manager.get_or_create("alice", channel.clone()).await.unwrap();
    router
        .select_model("alice", channel.clone(), "claude-opus-4-6")
        .await
        .unwrap();

    let record = manager.registry().get("alice").unwrap();
    assert_eq!(record.model, "claude-opus-4-6");
    assert_eq!(backend.open_count(), 2);
    assert!(channel
        .messages()
        .iter()
        .any(|m| m == "Model switched to **Claude Opus 4.6**. Session has been reset."));
}

#[tokio::test]
async fn test_select_unknown_model_is_rejected() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    router
        .select_model("alice", channel.clone(), "gpt-99")
        .await
        .unwrap();

    assert!(manager.registry().is_empty());
    assert_eq!(channel.messages(), vec!["Unknown model.".to_string()]);
}

#[tokio::test]
async fn test_select_mode_restarts_in_new_mode() {
    let backend = Arc::new(MockBackend::new());
    let (router, manager) = router(backend.clone());
    let channel = channel();

    router.select_mode("alice", channel.clone(), Mode::Plan).await.unwrap();

    let record = manager.registry().get("alice").unwrap();
    assert_eq!(record.mode, Mode::Plan);
    let opens = backend.recorded_opens();
    assert_eq!(opens.last().unwrap().permission_mode, PermissionMode::Plan);
    assert!(channel
        .messages()
        .iter()
        .any(|m| m == "Mode switched to **Plan (read-only)**. Session has been reset."));
}

#[tokio::test]
async fn test_mode_menu_marks_default_without_session() {
    let backend = Arc::new(MockBackend::new());
    let (router, _manager) = router(backend.clone());
    let channel = channel();

    router
        .handle_command("alice", channel.clone(), BotCommand::Mode)
        .await
        .unwrap();

    let menu = &channel.messages()[0];
    assert!(menu.contains("Choose a mode"));
    assert!(menu.contains("▸ Auto-Edit"));
}
