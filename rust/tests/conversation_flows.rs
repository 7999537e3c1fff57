use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use calla_core::{
    is_temp_id, now_ms, AppAction, AppReconciler, AppUpdate, CallaApp, ConversationSnapshot,
    DeliveryState, InternalEvent, Message, PinDuration, TimelineEntry,
};
use tempfile::tempdir;

fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("calla_config.json");
    let v = serde_json::json!({
        "disable_network": true,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

fn msg(id: &str, sender: &str, ts: i64, body: &str) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: "c1".to_string(),
        sender_id: sender.to_string(),
        body: body.to_string(),
        attachments: vec![],
        timestamp: ts,
        delivery: DeliveryState::Sent,
        read_by: BTreeSet::new(),
        starred_by: BTreeSet::new(),
        pinned: false,
        pinned_by: None,
        pin_expires_at: None,
        reactions: vec![],
        reply_to: None,
        deleted_for_everyone: false,
        deleted_for: BTreeSet::new(),
        edited: false,
        edited_at: None,
    }
}

fn open_app(data_dir: &str) -> Arc<CallaApp> {
    write_config(data_dir);
    let app = CallaApp::new(data_dir.to_string(), "me".to_string());
    app.dispatch(AppAction::OpenConversation {
        conversation_id: "c1".to_string(),
        peer_id: "peer".to_string(),
    });
    wait_until("conversation opens", Duration::from_secs(5), || {
        app.state().conversation.is_some()
    });
    app
}

fn inject_snapshot(app: &CallaApp, messages: Vec<Message>) {
    app.inject_internal_for_tests(InternalEvent::SnapshotFetched {
        conversation_id: "c1".to_string(),
        result: Ok(ConversationSnapshot {
            messages,
            calls: vec![],
            cleared_at: None,
        }),
    });
}

fn entry_ids(app: &CallaApp) -> Vec<String> {
    app.state()
        .conversation
        .map(|v| v.entries.iter().map(|e| e.id().to_string()).collect())
        .unwrap_or_default()
}

#[test]
fn send_shows_sending_then_swaps_to_canonical_id() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());

    app.dispatch(AppAction::SendMessage {
        conversation_id: "c1".to_string(),
        body: "hello".to_string(),
        attachments: vec![],
        reply_to: None,
    });
    wait_until("optimistic entry appears", Duration::from_secs(5), || {
        !entry_ids(&app).is_empty()
    });

    let view = app.state().conversation.unwrap();
    assert_eq!(view.entries.len(), 1);
    let temp_id = match &view.entries[0] {
        TimelineEntry::Message(m) => {
            assert!(is_temp_id(&m.id));
            assert_eq!(m.delivery, DeliveryState::Sending);
            m.id.clone()
        }
        other => panic!("expected a message entry, got {other:?}"),
    };

    let mut server = msg("m1", "me", now_ms(), "hello");
    server.delivery = DeliveryState::Sent;
    app.inject_internal_for_tests(InternalEvent::SendResult {
        conversation_id: "c1".to_string(),
        temp_id: temp_id.clone(),
        result: Ok(server),
    });

    wait_until("temp id swapped", Duration::from_secs(5), || {
        entry_ids(&app) == vec!["m1".to_string()]
    });
    let view = app.state().conversation.unwrap();
    assert_eq!(view.entries.len(), 1, "swap must not duplicate the entry");
    match &view.entries[0] {
        TimelineEntry::Message(m) => assert_eq!(m.delivery, DeliveryState::Sent),
        other => panic!("expected a message entry, got {other:?}"),
    }
}

#[test]
fn empty_send_is_rejected_with_a_toast() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());

    app.dispatch(AppAction::SendMessage {
        conversation_id: "c1".to_string(),
        body: "   ".to_string(),
        attachments: vec![],
        reply_to: None,
    });
    wait_until("toast appears", Duration::from_secs(5), || {
        app.state().toast.is_some()
    });
    assert!(entry_ids(&app).is_empty());
}

#[test]
fn failed_send_is_flagged_and_retry_reissues_it() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());

    app.dispatch(AppAction::SendMessage {
        conversation_id: "c1".to_string(),
        body: "hello".to_string(),
        attachments: vec![],
        reply_to: None,
    });
    wait_until("optimistic entry appears", Duration::from_secs(5), || {
        !entry_ids(&app).is_empty()
    });
    let temp_id = entry_ids(&app)[0].clone();

    app.inject_internal_for_tests(InternalEvent::SendResult {
        conversation_id: "c1".to_string(),
        temp_id: temp_id.clone(),
        result: Err(calla_core::ApiError::Network("timeout".to_string())),
    });
    wait_until("send marked failed", Duration::from_secs(5), || {
        let state = app.state();
        state
            .conversation
            .as_ref()
            .map(|v| {
                v.entries.iter().any(|e| match e {
                    TimelineEntry::Message(m) => {
                        matches!(m.delivery, DeliveryState::Failed { .. })
                    }
                    _ => false,
                })
            })
            .unwrap_or(false)
    });

    app.dispatch(AppAction::RetryMessage {
        conversation_id: "c1".to_string(),
        message_id: temp_id.clone(),
    });
    wait_until("retry issues a fresh attempt", Duration::from_secs(5), || {
        let ids = entry_ids(&app);
        ids.len() == 1 && ids[0] != temp_id && is_temp_id(&ids[0])
    });
    let view = app.state().conversation.unwrap();
    match &view.entries[0] {
        TimelineEntry::Message(m) => {
            assert_eq!(m.body, "hello");
            assert_eq!(m.delivery, DeliveryState::Sending);
        }
        other => panic!("expected a message entry, got {other:?}"),
    }
}

#[test]
fn opening_with_unread_targets_the_first_unread_entry() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());

    let mut messages = Vec::new();
    for i in 0..20 {
        let mut m = msg(&format!("m{i}"), "peer", 1_000 + i, &format!("body {i}"));
        if i < 13 {
            m.read_by.insert("me".to_string());
        }
        messages.push(m);
    }
    inject_snapshot(&app, messages);

    wait_until("snapshot applied", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.entries.len() == 20)
            .unwrap_or(false)
    });

    let view = app.state().conversation.unwrap();
    assert_eq!(view.unread_count, 7);
    assert_eq!(view.unread_divider_at, Some(13));
    assert_eq!(view.scroll_target, Some(13));
    assert!(!view.is_at_bottom);

    // The first manual scroll dismisses the divider for good.
    app.dispatch(AppAction::ViewportChanged {
        conversation_id: "c1".to_string(),
        scroll_height: 4000.0,
        scroll_top: 100.0,
        client_height: 800.0,
        user_initiated: true,
    });
    wait_until("divider cleared", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.unread_divider_at.is_none() && v.scroll_target.is_none())
            .unwrap_or(false)
    });
}

#[test]
fn scrolling_to_the_bottom_marks_incoming_as_read() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    inject_snapshot(&app, vec![msg("m1", "peer", 1_000, "hi")]);
    wait_until("snapshot applied", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.entries.len() == 1)
            .unwrap_or(false)
    });
    assert_eq!(app.state().conversation.unwrap().unread_count, 1);

    app.dispatch(AppAction::ViewportChanged {
        conversation_id: "c1".to_string(),
        scroll_height: 1000.0,
        scroll_top: 205.0,
        client_height: 800.0,
        user_initiated: true,
    });
    wait_until("unread drops to zero", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.unread_count == 0)
            .unwrap_or(false)
    });
}

#[test]
fn delete_for_me_hides_and_undo_restores() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    inject_snapshot(
        &app,
        vec![msg("m1", "peer", 1_000, "one"), msg("m2", "peer", 2_000, "two")],
    );
    wait_until("snapshot applied", Duration::from_secs(5), || {
        entry_ids(&app).len() == 2
    });

    app.dispatch(AppAction::DeleteForMe {
        conversation_id: "c1".to_string(),
        message_ids: vec!["m1".to_string()],
    });
    wait_until("entry hidden", Duration::from_secs(5), || {
        entry_ids(&app) == vec!["m2".to_string()]
    });

    app.dispatch(AppAction::UndoDeleteForMe {
        conversation_id: "c1".to_string(),
    });
    wait_until("entry restored", Duration::from_secs(5), || {
        entry_ids(&app) == vec!["m1".to_string(), "m2".to_string()]
    });
}

#[test]
fn delete_for_everyone_leaves_a_tombstone() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    inject_snapshot(&app, vec![msg("m1", "me", 1_000, "oops")]);
    wait_until("snapshot applied", Duration::from_secs(5), || {
        entry_ids(&app).len() == 1
    });

    let mut tombstone = msg("m1", "me", 1_000, "");
    tombstone.deleted_for_everyone = true;
    app.inject_internal_for_tests(InternalEvent::DeleteForEveryoneResult {
        conversation_id: "c1".to_string(),
        result: Ok(vec![tombstone]),
    });

    wait_until("tombstone applied", Duration::from_secs(5), || {
        let state = app.state();
        state
            .conversation
            .as_ref()
            .map(|v| {
                v.entries.len() == 1
                    && matches!(
                        &v.entries[0],
                        TimelineEntry::Message(m) if m.deleted_for_everyone
                    )
            })
            .unwrap_or(false)
    });
}

#[test]
fn expired_pin_drops_out_of_the_pinned_view() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    inject_snapshot(&app, vec![msg("m1", "peer", 1_000, "pin me")]);
    wait_until("snapshot applied", Duration::from_secs(5), || {
        entry_ids(&app).len() == 1
    });

    app.dispatch(AppAction::PinMessages {
        conversation_id: "c1".to_string(),
        message_ids: vec!["m1".to_string()],
        duration: PinDuration::CustomHours(2),
    });
    wait_until("pin appears", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.pinned.len() == 1)
            .unwrap_or(false)
    });

    // Server echo carrying an already-elapsed expiry. The message stays in the
    // timeline; only the pinned view filters it.
    let mut expired = msg("m1", "peer", 1_000, "pin me");
    expired.pinned = true;
    expired.pinned_by = Some("me".to_string());
    expired.pin_expires_at = Some(now_ms() - 1_000);
    app.ingest_push_frame(
        &serde_json::json!({
            "type": "comment_updated",
            "conversation_id": "c1",
            "message": expired,
        })
        .to_string(),
    );

    wait_until("expired pin filtered", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.pinned.is_empty() && v.entries.len() == 1)
            .unwrap_or(false)
    });
}

#[test]
fn second_session_cannot_open_checkout_while_lock_is_fresh() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir);

    let first = CallaApp::new(data_dir.to_string(), "me".to_string());
    first.dispatch(AppAction::BeginCheckout {
        appointment_id: "appt-1".to_string(),
    });
    wait_until("first session opens checkout", Duration::from_secs(5), || {
        first.state().checkout.is_some()
    });

    let second = CallaApp::new(data_dir.to_string(), "me".to_string());
    second.dispatch(AppAction::BeginCheckout {
        appointment_id: "appt-1".to_string(),
    });
    wait_until("second session gets a conflict", Duration::from_secs(5), || {
        second.state().toast.is_some()
    });
    assert!(second.state().checkout.is_none());

    // A different appointment is unaffected.
    second.dispatch(AppAction::BeginCheckout {
        appointment_id: "appt-2".to_string(),
    });
    wait_until("other appointment opens", Duration::from_secs(5), || {
        second.state().checkout.is_some()
    });
}

#[test]
fn server_conflict_on_lock_initialize_keeps_checkout_closed() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir);
    let app = CallaApp::new(data_dir.to_string(), "me".to_string());

    // Another device won the initialize race; the 409 is the lock holding,
    // not a lock-service outage.
    app.inject_internal_for_tests(InternalEvent::PaymentLockChecked {
        appointment_id: "appt-1".to_string(),
        result: Err(calla_core::ApiError::Conflict("lock held".to_string())),
    });
    wait_until("conflict surfaces", Duration::from_secs(5), || {
        app.state().toast.is_some()
    });
    assert!(app.state().checkout.is_none());
}

#[test]
fn lock_held_by_another_device_keeps_checkout_closed() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir);
    let app = CallaApp::new(data_dir.to_string(), "me".to_string());

    app.inject_internal_for_tests(InternalEvent::PaymentLockChecked {
        appointment_id: "appt-1".to_string(),
        result: Ok(calla_core::PaymentLockStatus {
            owner_token: Some("someone-else".to_string()),
            expires_at: Some(now_ms() + 60_000),
        }),
    });
    wait_until("conflict surfaces", Duration::from_secs(5), || {
        app.state().toast.is_some()
    });
    assert!(app.state().checkout.is_none());
}

#[test]
fn unreachable_lock_service_fails_open() {
    let dir = tempdir().unwrap();
    let data_dir = dir.path().to_str().unwrap();
    write_config(data_dir);
    let app = CallaApp::new(data_dir.to_string(), "me".to_string());

    app.inject_internal_for_tests(InternalEvent::PaymentLockChecked {
        appointment_id: "appt-1".to_string(),
        result: Err(calla_core::ApiError::Network("timeout".to_string())),
    });
    wait_until("checkout opens anyway", Duration::from_secs(5), || {
        app.state().checkout.is_some()
    });
}

#[test]
fn locked_chat_refuses_writes_until_granted() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    app.inject_internal_for_tests(InternalEvent::LockStateFetched {
        conversation_id: "c1".to_string(),
        result: Ok(calla_core::LockStatus {
            locked: true,
            access_granted: false,
        }),
    });
    wait_until("timeline hides", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.lock.timeline_hidden())
            .unwrap_or(false)
    });

    app.dispatch(AppAction::SendMessage {
        conversation_id: "c1".to_string(),
        body: "should not land".to_string(),
        attachments: vec![],
        reply_to: None,
    });

    // Granting access afterwards reveals an unchanged timeline: the send was
    // refused outright, not merely hidden.
    app.inject_internal_for_tests(InternalEvent::LockStateFetched {
        conversation_id: "c1".to_string(),
        result: Ok(calla_core::LockStatus {
            locked: true,
            access_granted: true,
        }),
    });
    wait_until("timeline reappears", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| !v.lock.timeline_hidden())
            .unwrap_or(false)
    });
    assert!(entry_ids(&app).is_empty());
}

#[test]
fn duplicated_read_receipts_apply_once() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    let mut own = msg("m1", "me", 1_000, "sent earlier");
    own.delivery = DeliveryState::Sent;
    inject_snapshot(&app, vec![own]);
    wait_until("snapshot applied", Duration::from_secs(5), || {
        entry_ids(&app).len() == 1
    });

    let frame = serde_json::json!({
        "type": "message_read",
        "conversation_id": "c1",
        "message_ids": ["m1"],
        "user_id": "peer",
    })
    .to_string();
    app.ingest_push_frame(&frame);
    app.ingest_push_frame(&frame);
    // A stale delivered event after the read must not regress the state.
    app.ingest_push_frame(
        &serde_json::json!({
            "type": "message_delivered",
            "conversation_id": "c1",
            "message_ids": ["m1"],
            "user_id": "peer",
        })
        .to_string(),
    );

    wait_until("read receipt applied", Duration::from_secs(5), || {
        let state = app.state();
        state
            .conversation
            .as_ref()
            .map(|v| {
                matches!(
                    &v.entries[0],
                    TimelineEntry::Message(m) if m.delivery == DeliveryState::Read
                )
            })
            .unwrap_or(false)
    });
    let view = app.state().conversation.unwrap();
    match &view.entries[0] {
        TimelineEntry::Message(m) => assert_eq!(m.read_by.len(), 1),
        other => panic!("expected a message entry, got {other:?}"),
    }
}

#[test]
fn malformed_push_frames_are_dropped_at_the_boundary() {
    let dir = tempdir().unwrap();
    let app = open_app(dir.path().to_str().unwrap());
    inject_snapshot(&app, vec![msg("m1", "peer", 1_000, "hi")]);
    wait_until("snapshot applied", Duration::from_secs(5), || {
        entry_ids(&app).len() == 1
    });

    app.ingest_push_frame("not json at all");
    app.ingest_push_frame(r#"{"type": "mystery_event", "conversation_id": "c1"}"#);

    // Engine still works afterwards.
    app.ingest_push_frame(
        &serde_json::json!({
            "type": "typing",
            "conversation_id": "c1",
            "user_id": "peer",
            "is_typing": true,
        })
        .to_string(),
    );
    wait_until("typing indicator shows", Duration::from_secs(5), || {
        app.state()
            .conversation
            .as_ref()
            .map(|v| v.typing_peers == vec!["peer".to_string()])
            .unwrap_or(false)
    });
    assert_eq!(entry_ids(&app), vec!["m1".to_string()]);
}
