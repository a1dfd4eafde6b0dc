//! Integration tests for the optimistic send and poll reconciliation flow.
//!
//! Drives a [`ChatEngine`] over a scripted [`MemoryTransport`] and checks:
//!
//! **Scenarios:**
//! 1. A pending send sorts after an older desk reply, then is replaced in
//!    place by the backend's record.
//! 2. A failed send removes the pending record and gives the text back.
//! 3. A second submit while one is in flight is refused.
//! 4. A failed poll leaves the list, including pending records, untouched.
//! 5. Malformed records degrade instead of failing the poll.
//! 6. A poll issued before a commit cannot drop the confirmed message.
//!
//! **Invariants:**
//! 1. Ids are unique in the visible list.
//! 2. The list is sorted by `occurred_at`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use deskchat::chat::message::{Message, MessageId, Sender};
use deskchat::chat::{ChatEngine, ChatEvent, SendError};
use deskchat::config::ChatConfig;
use deskchat::transport::memory::MemoryTransport;
use deskchat_proto::message::{RawId, RawMessage, ValidationError};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn engine() -> (
    Arc<ChatEngine<MemoryTransport>>,
    mpsc::Receiver<ChatEvent>,
    MemoryTransport,
) {
    let transport = MemoryTransport::new();
    let (engine, events) = ChatEngine::new(transport.clone(), ChatConfig::default());
    (Arc::new(engine), events, transport)
}

/// A desk reply dated well in the past, with an id the transport never
/// hands out itself.
fn old_reply(id: i64, text: &str, created_at: &str) -> RawMessage {
    RawMessage::new(text, "admin")
        .with_id(RawId::Number(id))
        .with_created_at(created_at)
}

fn assert_well_formed(messages: &[Message]) {
    let ids: HashSet<&MessageId> = messages.iter().map(|m| &m.id).collect();
    assert_eq!(ids.len(), messages.len(), "duplicate ids in {messages:?}");
    assert!(
        messages
            .windows(2)
            .all(|pair| pair[0].occurred_at <= pair[1].occurred_at),
        "list not sorted: {messages:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn pending_send_is_replaced_by_confirmed_record() {
    let (engine, mut events, transport) = engine();
    transport.push_raw(old_reply(100, "hello", "2024-05-01T10:00:00Z"));
    assert!(engine.poll_once().await);

    transport.set_send_delay(Duration::from_millis(500));
    let mut view = engine.subscribe();
    let sending = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send_text("hi").await }
    });

    let during = Arc::clone(&view.wait_for(|v| v.sending).await.unwrap().messages);
    assert_eq!(during.len(), 2);
    assert_eq!(during[0].text, "hello");
    assert_eq!(during[0].sender, Sender::Counterpart);
    assert_eq!(during[1].text, "hi");
    assert!(during[1].pending);
    assert!(during[1].id.is_local());
    assert_well_formed(&during);

    let confirmed = sending.await.unwrap().unwrap();
    let after = engine.messages();
    assert_eq!(after.len(), 2);
    assert_eq!(after[1].id, confirmed.id);
    assert_eq!(after[1].sender, Sender::Me);
    assert!(after.iter().all(|m| !m.pending));
    assert_well_formed(&after);

    assert_eq!(
        events.recv().await,
        Some(ChatEvent::MessageConfirmed { id: confirmed.id })
    );
}

#[tokio::test]
async fn failed_send_rolls_back_and_notifies() {
    let (engine, mut events, transport) = engine();
    transport.push_reply("how can we help?");
    assert!(engine.poll_once().await);

    transport.fail_next_sends(1);
    engine.set_composer("my order is stuck");
    let err = engine.submit().await.unwrap_err();
    assert!(matches!(err, SendError::Transport(_)));

    let messages = engine.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages.iter().all(|m| !m.pending));
    assert_eq!(engine.composer(), "my order is stuck");
    assert!(!engine.is_sending());

    match events.recv().await {
        Some(ChatEvent::SendFailed { text, reason }) => {
            assert_eq!(text, "my order is stuck");
            assert!(!reason.is_empty());
        }
        other => panic!("expected SendFailed, got {other:?}"),
    }

    // The restored text can be sent again.
    let confirmed = engine.submit().await.unwrap();
    assert_eq!(confirmed.text, "my order is stuck");
    assert_eq!(engine.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn second_submit_during_flight_is_refused() {
    let (engine, _events, transport) = engine();
    transport.set_send_delay(Duration::from_secs(1));

    let mut view = engine.subscribe();
    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send_text("first").await }
    });
    view.wait_for(|v| v.sending).await.unwrap();

    let err = engine.send_text("second").await.unwrap_err();
    assert!(matches!(err, SendError::Cooldown));

    first.await.unwrap().unwrap();
    assert_eq!(transport.send_calls(), 1);
    assert_eq!(engine.messages().len(), 1);
    assert!(!engine.is_sending());
}

#[tokio::test]
async fn empty_submit_is_a_no_op() {
    let (engine, mut events, transport) = engine();
    engine.set_composer(" \t ");
    let err = engine.submit().await.unwrap_err();
    assert!(matches!(err, SendError::Validation(ValidationError::Empty)));
    assert!(engine.messages().is_empty());
    assert_eq!(transport.send_calls(), 0);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_poll_keeps_pending_records() {
    let (engine, _events, transport) = engine();
    transport.push_reply("hello");
    assert!(engine.poll_once().await);

    transport.set_send_delay(Duration::from_secs(1));
    let mut view = engine.subscribe();
    let sending = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.send_text("hi").await }
    });
    view.wait_for(|v| v.sending).await.unwrap();

    transport.set_history_available(false);
    assert!(!engine.poll_once().await);
    let messages = engine.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].pending);

    transport.set_history_available(true);
    sending.await.unwrap().unwrap();
    assert_eq!(engine.messages().len(), 2);
    assert!(engine.messages().iter().all(|m| !m.pending));
}

#[tokio::test]
async fn malformed_records_degrade() {
    let (engine, _events, transport) = engine();
    transport.push_raw(old_reply(100, "dated", "2024-05-01 10:00:00"));
    transport.push_raw(RawMessage::new("undated", "admin"));
    transport.push_raw(
        RawMessage::new("garbled", "support-bot")
            .with_id(RawId::Text("x-1".into()))
            .with_created_at("yesterday-ish"),
    );
    transport.push_raw(RawMessage {
        id: Some(RawId::Number(101)),
        message: "no role".into(),
        from_role: None,
        created_at: Some("2024-05-01T10:00:01Z".into()),
    });

    assert!(engine.poll_once().await);
    let messages = engine.messages();
    assert_eq!(messages.len(), 4);
    assert_well_formed(&messages);

    assert_eq!(messages[0].text, "dated");
    assert_eq!(messages[1].text, "no role");
    assert!(messages.iter().all(|m| m.sender == Sender::Counterpart));

    let undated = messages.iter().find(|m| m.text == "undated").unwrap();
    assert!(matches!(undated.id, MessageId::Synthesized(_)));
    let garbled = messages.iter().find(|m| m.text == "garbled").unwrap();
    assert_eq!(garbled.id, MessageId::Server("x-1".into()));
    // Both fall back to the same "now", so response order is kept.
    let undated_at = messages.iter().position(|m| m.text == "undated");
    let garbled_at = messages.iter().position(|m| m.text == "garbled");
    assert!(undated_at < garbled_at);
}

#[tokio::test]
async fn numeric_and_string_ids_are_the_same_record() {
    let (engine, _events, transport) = engine();
    transport.push_raw(old_reply(100, "first copy", "2024-05-01T10:00:00Z"));
    transport.push_raw(
        RawMessage::new("second copy", "admin")
            .with_id(RawId::Text("100".into()))
            .with_created_at("2024-05-01T10:00:00Z"),
    );

    assert!(engine.poll_once().await);
    let messages = engine.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "second copy");
}

#[tokio::test]
async fn blank_ids_do_not_collapse_records() {
    let (engine, _events, transport) = engine();
    transport.push_raw(RawMessage::new("first", "admin").with_id(RawId::Text(String::new())));
    transport.push_raw(RawMessage::new("second", "admin").with_id(RawId::Text("  ".into())));

    assert!(engine.poll_once().await);
    let messages = engine.messages();
    assert_well_formed(&messages);
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["first", "second"]);
    assert!(messages.iter().all(|m| matches!(m.id, MessageId::Synthesized(_))));
}

#[tokio::test]
async fn id_less_records_keep_their_id_across_polls() {
    let (engine, _events, transport) = engine();
    transport.push_raw(RawMessage::new("welcome", "admin"));

    assert!(engine.poll_once().await);
    let first = engine.messages()[0].id.clone();
    assert!(engine.poll_once().await);
    assert!(engine.poll_once().await);

    let messages = engine.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, first);
}

#[tokio::test(start_paused = true)]
async fn poll_issued_before_commit_keeps_confirmed_message() {
    let (engine, _events, transport) = engine();

    // This poll sees the empty conversation and answers late.
    transport.set_history_delay(Duration::from_secs(1));
    let stale = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.poll_once().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The follow-up poll after the send fails, so only the stale one lands.
    transport.set_history_delay(Duration::ZERO);
    transport.set_history_available(false);
    let confirmed = engine.send_text("hi").await.unwrap();

    assert!(stale.await.unwrap());
    let messages = engine.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, confirmed.id);
    assert!(!messages[0].pending);

    // Once a poll issued after the commit lands, the server copy takes over.
    transport.set_history_available(true);
    assert!(engine.poll_once().await);
    assert_eq!(engine.messages().len(), 1);
    assert_eq!(engine.messages()[0].id, confirmed.id);
}

#[tokio::test]
async fn merged_list_stays_sorted_and_unique() {
    let (engine, _events, transport) = engine();
    transport.push_raw(old_reply(200, "c", "2024-05-01T10:00:03Z"));
    transport.push_raw(old_reply(100, "a", "2024-05-01T10:00:01Z"));
    transport.push_raw(old_reply(150, "b", "2024-05-01T10:00:02Z"));
    transport.push_raw(old_reply(100, "a again", "2024-05-01T10:00:01Z"));

    assert!(engine.poll_once().await);
    engine.send_text("mine").await.unwrap();
    transport.push_reply("latest");
    assert!(engine.poll_once().await);

    let messages = engine.messages();
    assert_well_formed(&messages);
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["a again", "b", "c", "mine", "latest"]);
}
