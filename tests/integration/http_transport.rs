//! Integration tests for `HttpTransport` against the in-process stub backend.
//!
//! Each test starts a stub server on `127.0.0.1:0` and talks to it over
//! real HTTP:
//! 1. History, send and mark-read round trip through the REST endpoints.
//! 2. Bearer tokens are sent and enforced.
//! 3. Backend rejections surface as `TransportError::Status`.
//! 4. A full chat screen converges with the backend's conversation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use deskchat::chat::message::{MessageId, Sender};
use deskchat::chat::{ChatEngine, ChatEvent, SendError};
use deskchat::config::ChatConfig;
use deskchat::screen::ChatScreen;
use deskchat::transport::http::{BackendConfig, HttpTransport};
use deskchat::transport::{ChatTransport, TransportError, TransportType};
use deskchat_proto::message::{RawId, SendRequest};
use deskchat_stub::server::{StubState, start_server_with_state};
use deskchat_stub::store::ConversationStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_stub(token: Option<&str>) -> (SocketAddr, Arc<StubState>) {
    let state = Arc::new(StubState::with_config(
        token.map(str::to_string),
        ConversationStore::new(),
        "user",
        "admin",
    ));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (addr, state)
}

fn transport(addr: SocketAddr, token: Option<&str>) -> HttpTransport {
    let mut config = BackendConfig::new(format!("http://{addr}"));
    config.token = token.map(str::to_string);
    config.request_timeout = Duration::from_secs(5);
    HttpTransport::new(&config).unwrap()
}

// ---------------------------------------------------------------------------
// Transport calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_send_and_read_round_trip() {
    let (addr, state) = start_stub(None).await;
    let transport = transport(addr, None);
    assert_eq!(transport.transport_type(), TransportType::Http);

    assert!(transport.fetch_history().await.unwrap().is_empty());

    state.store.append("hello from the desk", "admin").await;
    let sent = transport.send(&SendRequest::new("hi")).await.unwrap();
    assert_eq!(sent.id, Some(RawId::Number(2)));
    assert_eq!(sent.message, "hi");
    assert_eq!(sent.from_role.as_deref(), Some("user"));
    assert!(sent.created_at.is_some());

    let history = transport.fetch_history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].message, "hello from the desk");
    assert_eq!(history[1], sent);

    assert_eq!(state.store.unread().await, 1);
    transport.mark_all_read().await.unwrap();
    assert_eq!(state.store.unread().await, 0);
}

#[tokio::test]
async fn token_is_sent_and_enforced() {
    let (addr, _state) = start_stub(Some("secret")).await;

    let anonymous = transport(addr, None);
    let err = anonymous.fetch_history().await.unwrap_err();
    assert!(matches!(err, TransportError::Status(401)));

    let wrong = transport(addr, Some("nope"));
    assert!(matches!(
        wrong.send(&SendRequest::new("hi")).await,
        Err(TransportError::Status(401))
    ));

    let authorized = transport(addr, Some("secret"));
    authorized.send(&SendRequest::new("hi")).await.unwrap();
    assert_eq!(authorized.fetch_history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn blank_message_is_rejected_by_backend() {
    let (addr, state) = start_stub(None).await;
    let transport = transport(addr, None);

    let err = transport.send(&SendRequest::new("   ")).await.unwrap_err();
    assert!(matches!(err, TransportError::Status(422)));
    assert!(state.store.is_empty().await);
}

#[tokio::test]
async fn unreachable_backend_is_an_http_error() {
    // Bind and immediately free a port so nothing is listening on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = transport(addr, None);
    assert!(matches!(
        transport.fetch_history().await,
        Err(TransportError::Http(_))
    ));
}

// ---------------------------------------------------------------------------
// Engine over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_send_and_poll_over_http() {
    let (addr, state) = start_stub(None).await;
    let (engine, mut events) = ChatEngine::new(transport(addr, None), ChatConfig::default());

    state.store.append("hello", "admin").await;
    assert!(engine.poll_once().await);

    let confirmed = engine.send_text("hi there").await.unwrap();
    assert_eq!(confirmed.id, MessageId::Server("2".into()));
    assert_eq!(
        events.recv().await,
        Some(ChatEvent::MessageConfirmed {
            id: confirmed.id.clone()
        })
    );

    let messages = engine.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::Counterpart);
    assert_eq!(messages[1].id, confirmed.id);
    assert!(messages.iter().all(|m| !m.pending));
}

#[tokio::test]
async fn engine_send_rejection_rolls_back() {
    let (addr, _state) = start_stub(Some("secret")).await;
    let (engine, mut events) = ChatEngine::new(transport(addr, None), ChatConfig::default());

    engine.set_composer("hello?");
    let err = engine.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SendError::Transport(TransportError::Status(401))
    ));
    assert!(engine.messages().is_empty());
    assert_eq!(engine.composer(), "hello?");
    assert!(matches!(
        events.recv().await,
        Some(ChatEvent::SendFailed { .. })
    ));
}

#[tokio::test]
async fn mounted_screen_sees_desk_replies() {
    let (addr, state) = start_stub(None).await;
    state.store.append("welcome", "admin").await;

    let config = ChatConfig {
        poll_interval: Duration::from_millis(100),
        ..ChatConfig::default()
    };
    let (screen, _events) = ChatScreen::mount(transport(addr, None), config);
    let mut view = screen.subscribe();

    view.wait_for(|v| v.messages.len() == 1).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.store.unread().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    screen.send("thanks").await.unwrap();
    state.store.append("you're welcome", "admin").await;

    let messages = tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|v| v.messages.len() == 3),
    )
    .await
    .unwrap()
    .unwrap()
    .messages
    .clone();
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["welcome", "thanks", "you're welcome"]);

    screen.unmount().await;
}
