use crate::events::PushEvent;
use crate::rest::{ApiError, ConversationSnapshot, LockStatus, PaymentLockStatus};
use crate::state::{AppState, Message};

/// Stream of state updates emitted by the core. Full snapshots only; the
/// `rev` counter lets listeners detect gaps and fall back to `CallaApp::state`.
#[derive(Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(crate::actions::AppAction),
    Internal(Box<InternalEvent>),
}

/// Results of async side effects (REST calls, parsed push frames) routed back
/// into the single-threaded actor loop.
#[derive(Debug)]
pub enum InternalEvent {
    // Conversation open
    SnapshotFetched {
        conversation_id: String,
        result: Result<ConversationSnapshot, ApiError>,
    },
    LockStateFetched {
        conversation_id: String,
        result: Result<LockStatus, ApiError>,
    },

    // Messaging results
    SendResult {
        conversation_id: String,
        temp_id: String,
        result: Result<Message, ApiError>,
    },
    EditResult {
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    },
    ReactionResult {
        conversation_id: String,
        message_id: String,
        emoji: String,
        result: Result<Message, ApiError>,
    },
    MarkReadResult {
        conversation_id: String,
        message_ids: Vec<String>,
        result: Result<(), ApiError>,
    },

    // Deletion results
    DeleteForEveryoneResult {
        conversation_id: String,
        result: Result<Vec<Message>, ApiError>,
    },
    /// Bulk delete-for-me reports per-item outcomes; rendering updates
    /// incrementally as confirmations arrive.
    DeleteForMeResult {
        conversation_id: String,
        message_id: String,
        result: Result<(), ApiError>,
    },
    ClearResult {
        conversation_id: String,
        result: Result<i64, ApiError>,
    },

    // Annotation results
    StarResult {
        conversation_id: String,
        message_id: String,
        starred: bool,
        result: Result<(), ApiError>,
    },
    /// Bulk pin is per-item: each message reports its own success/failure.
    PinResult {
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    },
    UnpinResult {
        conversation_id: String,
        message_id: String,
        result: Result<Message, ApiError>,
    },

    // Chat access lock
    UnlockResult {
        conversation_id: String,
        result: Result<bool, ApiError>,
    },
    HistoryWiped {
        conversation_id: String,
        result: Result<(), ApiError>,
    },

    // Payment session lock
    PaymentLockChecked {
        appointment_id: String,
        result: Result<PaymentLockStatus, ApiError>,
    },

    // Push channel
    Push(PushEvent),

    Toast(String),
}

impl InternalEvent {
    /// Log-safe tag, mirroring `AppAction::tag`.
    pub fn tag(&self) -> &'static str {
        match self {
            InternalEvent::SnapshotFetched { .. } => "SnapshotFetched",
            InternalEvent::LockStateFetched { .. } => "LockStateFetched",
            InternalEvent::SendResult { .. } => "SendResult",
            InternalEvent::EditResult { .. } => "EditResult",
            InternalEvent::ReactionResult { .. } => "ReactionResult",
            InternalEvent::MarkReadResult { .. } => "MarkReadResult",
            InternalEvent::DeleteForEveryoneResult { .. } => "DeleteForEveryoneResult",
            InternalEvent::DeleteForMeResult { .. } => "DeleteForMeResult",
            InternalEvent::ClearResult { .. } => "ClearResult",
            InternalEvent::StarResult { .. } => "StarResult",
            InternalEvent::PinResult { .. } => "PinResult",
            InternalEvent::UnpinResult { .. } => "UnpinResult",
            InternalEvent::UnlockResult { .. } => "UnlockResult",
            InternalEvent::HistoryWiped { .. } => "HistoryWiped",
            InternalEvent::PaymentLockChecked { .. } => "PaymentLockChecked",
            InternalEvent::Push(_) => "Push",
            InternalEvent::Toast(_) => "Toast",
        }
    }
}
