use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Delivery lifecycle of a message as seen by this client.
///
/// Rank order is `Sending < Sent < Delivered < Read`; reconciliation keeps the
/// max rank and never regresses (a push event replayed out of order must not
/// downgrade a locally-held `Read` to `Delivered`). `Failed` is terminal and
/// only reachable from `Sending`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed { reason: String },
}

impl DeliveryState {
    pub fn rank(&self) -> u8 {
        match self {
            DeliveryState::Sending => 0,
            DeliveryState::Sent => 1,
            DeliveryState::Delivered => 2,
            DeliveryState::Read => 3,
            // Failed sorts with Sending: it never outranks confirmed states.
            DeliveryState::Failed { .. } => 0,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.rank() >= DeliveryState::Sent.rank()
    }

    /// Monotonic merge: keep whichever state is further along.
    pub fn merged_with(&self, incoming: &DeliveryState) -> DeliveryState {
        if incoming.rank() > self.rank() {
            incoming.clone()
        } else {
            self.clone()
        }
    }
}

/// Typed media attachment. The upload service and file storage are external
/// collaborators; the engine only carries the resolved URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    Document { url: String, name: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: String,
    pub emoji: String,
}

/// A message in the per-conversation timeline. Doubles as the wire shape for
/// REST snapshots and push payloads.
///
/// `id` is a locally-unique temp id (`temp-<uuid>`) until the server ack swaps
/// in the canonical id; after confirmation exactly one id exists per logical
/// message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    #[serde(default = "default_delivery")]
    pub delivery: DeliveryState,
    #[serde(default)]
    pub read_by: BTreeSet<String>,
    #[serde(default)]
    pub starred_by: BTreeSet<String>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub pinned_by: Option<String>,
    #[serde(default)]
    pub pin_expires_at: Option<i64>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// May reference a call entry as well as a message.
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub deleted_for_everyone: bool,
    #[serde(default)]
    pub deleted_for: BTreeSet<String>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub edited_at: Option<i64>,
}

fn default_delivery() -> DeliveryState {
    DeliveryState::Sent
}

pub const TEMP_ID_PREFIX: &str = "temp-";

pub fn new_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4())
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

impl Message {
    /// True while the pin is inside its TTL. Expired pin metadata is kept on
    /// the message; the pinned view filters it out at read time.
    pub fn pin_active(&self, now_ms: i64) -> bool {
        self.pinned && self.pin_expires_at.map(|t| now_ms < t).unwrap_or(false)
    }

    pub fn visible_to(&self, user_id: &str) -> bool {
        // Tombstones stay visible to everyone; delete-for-me hides outright.
        !self.deleted_for.contains(user_id)
    }
}

/// Read-only call projection merged into the timeline by timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: String,
    pub caller_id: String,
    pub receiver_id: String,
    pub call_type: String,
    pub status: String,
    #[serde(default)]
    pub duration_secs: u32,
    /// Milliseconds since epoch.
    pub started_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
pub enum TimelineEntry {
    Message(Message),
    Call(Call),
}

impl TimelineEntry {
    pub fn timestamp(&self) -> i64 {
        match self {
            TimelineEntry::Message(m) => m.timestamp,
            TimelineEntry::Call(c) => c.started_at,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TimelineEntry::Message(m) => &m.id,
            TimelineEntry::Call(c) => &c.id,
        }
    }
}

/// Pin duration presets plus the custom-hours escape hatch. The server
/// computes the authoritative `pin_expires_at`; the client projects the same
/// arithmetic optimistically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinDuration {
    Day,
    Week,
    Month,
    CustomHours(u32),
}

impl PinDuration {
    pub fn as_hours(&self) -> u32 {
        match self {
            PinDuration::Day => 24,
            PinDuration::Week => 24 * 7,
            PinDuration::Month => 24 * 30,
            PinDuration::CustomHours(h) => *h,
        }
    }

    pub fn as_ms(&self) -> i64 {
        i64::from(self.as_hours()) * 60 * 60 * 1000
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatLockState {
    pub locked: bool,
    /// Session-scoped; never persisted, reset server-side on close.
    pub access_granted: bool,
}

impl ChatLockState {
    pub fn open() -> Self {
        Self {
            locked: false,
            access_granted: true,
        }
    }

    pub fn timeline_hidden(&self) -> bool {
        self.locked && !self.access_granted
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppointmentSummary {
    pub appointment_id: String,
    pub status: String,
}

/// Snapshot of the open conversation as the render layer should show it.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversationViewState {
    pub conversation_id: String,
    pub peer_id: String,
    /// Rendered window only: the newest page(s) of visible entries, ascending
    /// by timestamp. Empty while the chat lock hides the timeline.
    pub entries: Vec<TimelineEntry>,
    /// Currently pinned messages (TTL-filtered at read time).
    pub pinned: Vec<Message>,
    pub unread_count: u32,
    /// One-shot "N unread" divider: index into `entries`. Cleared on the
    /// first manual scroll, never persisted.
    pub unread_divider_at: Option<u32>,
    /// Index into `entries` the host should scroll to, if any.
    pub scroll_target: Option<u32>,
    pub is_at_bottom: bool,
    pub can_load_older: bool,
    /// How many entries the last load-older prepended; the host offsets its
    /// scroll position by the matching height delta to preserve the anchor.
    pub prepended_count: u32,
    pub draft: String,
    pub lock: ChatLockState,
    pub typing_peers: Vec<String>,
    pub peer_online: Option<bool>,
    pub latest_appointment: Option<AppointmentSummary>,
}

/// An open checkout flow holding the payment session lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutState {
    pub appointment_id: String,
    pub owner_token: String,
    pub opened_at: i64,
}

/// In-flight flags for operations the UI should reflect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyState {
    pub opening_conversation: bool,
    pub unlocking_chat: bool,
    pub checking_payment_lock: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self {
            opening_conversation: false,
            unlocking_chat: false,
            checking_payment_lock: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub busy: BusyState,
    pub conversation: Option<ConversationViewState>,
    pub checkout: Option<CheckoutState>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            busy: BusyState::idle(),
            conversation: None,
            checkout: None,
            toast: None,
        }
    }
}

pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
pub(crate) fn test_message(id: &str, sender: &str, ts: i64) -> Message {
    Message {
        id: id.to_string(),
        conversation_id: "c1".to_string(),
        sender_id: sender.to_string(),
        body: format!("body-{id}"),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_rank_is_monotonic_under_merge() {
        let read = DeliveryState::Read;
        assert_eq!(
            read.merged_with(&DeliveryState::Delivered),
            DeliveryState::Read
        );
        assert_eq!(
            DeliveryState::Sent.merged_with(&DeliveryState::Delivered),
            DeliveryState::Delivered
        );
        // Failed never outranks a confirmed state.
        let failed = DeliveryState::Failed {
            reason: "offline".into(),
        };
        assert_eq!(DeliveryState::Sent.merged_with(&failed), DeliveryState::Sent);
    }

    #[test]
    fn temp_ids_are_recognizable_and_unique() {
        let a = new_temp_id();
        let b = new_temp_id();
        assert!(is_temp_id(&a));
        assert!(is_temp_id(&b));
        assert_ne!(a, b);
        assert!(!is_temp_id("m1"));
    }

    #[test]
    fn pin_activity_is_a_pure_ttl_filter() {
        let mut m = test_message("m1", "seller", 1_000);
        assert!(!m.pin_active(2_000));

        m.pinned = true;
        m.pin_expires_at = Some(10_000);
        assert!(m.pin_active(9_999));
        assert!(!m.pin_active(10_000));
        // Metadata survives expiry; only the filter changes.
        assert!(m.pinned);
    }

    #[test]
    fn pin_duration_presets() {
        assert_eq!(PinDuration::Day.as_ms(), 24 * 3_600_000);
        assert_eq!(PinDuration::Week.as_hours(), 168);
        assert_eq!(PinDuration::CustomHours(2).as_ms(), 2 * 3_600_000);
    }

    #[test]
    fn lock_state_hides_timeline_until_granted() {
        let locked = ChatLockState {
            locked: true,
            access_granted: false,
        };
        assert!(locked.timeline_hidden());
        let granted = ChatLockState {
            locked: true,
            access_granted: true,
        };
        assert!(!granted.timeline_hidden());
        assert!(!ChatLockState::open().timeline_hidden());
    }

    #[test]
    fn message_wire_shape_tolerates_sparse_payloads() {
        let json = r#"{
            "id": "m1",
            "conversation_id": "c1",
            "sender_id": "seller",
            "body": "hello",
            "timestamp": 1000
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.delivery, DeliveryState::Sent);
        assert!(m.read_by.is_empty());
        assert!(!m.pinned);
    }
}
