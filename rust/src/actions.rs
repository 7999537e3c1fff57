use crate::state::{Attachment, PinDuration};

/// User intents dispatched into the core. The render layer calls `dispatch`
/// with these instead of threading per-widget callbacks around.
#[derive(Debug, Clone)]
pub enum AppAction {
    // Conversation lifecycle
    OpenConversation {
        conversation_id: String,
        peer_id: String,
    },
    CloseConversation,

    // Messaging
    SendMessage {
        conversation_id: String,
        body: String,
        attachments: Vec<Attachment>,
        reply_to: Option<String>,
    },
    RetryMessage {
        conversation_id: String,
        message_id: String,
    },
    EditMessage {
        conversation_id: String,
        message_id: String,
        body: String,
    },
    ToggleReaction {
        conversation_id: String,
        message_id: String,
        emoji: String,
    },

    // Annotations
    SetStarred {
        conversation_id: String,
        message_id: String,
        starred: bool,
    },
    PinMessages {
        conversation_id: String,
        message_ids: Vec<String>,
        duration: PinDuration,
    },
    UnpinMessage {
        conversation_id: String,
        message_id: String,
    },

    // Deletion
    DeleteForMe {
        conversation_id: String,
        message_ids: Vec<String>,
    },
    /// Restores the most recent delete-for-me batch while its undo window is
    /// still open.
    UndoDeleteForMe {
        conversation_id: String,
    },
    DeleteForEveryone {
        conversation_id: String,
        message_ids: Vec<String>,
    },
    ClearConversation {
        conversation_id: String,
    },

    // Viewport / paging
    ViewportChanged {
        conversation_id: String,
        scroll_height: f64,
        scroll_top: f64,
        client_height: f64,
        /// True when the user scrolled, false for programmatic moves. The
        /// unread divider is one-shot: cleared on the first manual scroll.
        user_initiated: bool,
    },
    LoadOlderMessages {
        conversation_id: String,
    },

    // Drafts
    SetDraft {
        conversation_id: String,
        text: String,
    },

    // Chat access lock
    UnlockChat {
        conversation_id: String,
        password: String,
    },
    /// Destructive: clears the lock AND wipes message history. Refused unless
    /// `confirm_wipe` is set.
    ForgotChatPassword {
        conversation_id: String,
        confirm_wipe: bool,
    },

    // Payment session lock
    BeginCheckout {
        appointment_id: String,
    },
    DismissCheckout,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes message bodies or passwords).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::OpenConversation { .. } => "OpenConversation",
            AppAction::CloseConversation => "CloseConversation",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::RetryMessage { .. } => "RetryMessage",
            AppAction::EditMessage { .. } => "EditMessage",
            AppAction::ToggleReaction { .. } => "ToggleReaction",
            AppAction::SetStarred { .. } => "SetStarred",
            AppAction::PinMessages { .. } => "PinMessages",
            AppAction::UnpinMessage { .. } => "UnpinMessage",
            AppAction::DeleteForMe { .. } => "DeleteForMe",
            AppAction::UndoDeleteForMe { .. } => "UndoDeleteForMe",
            AppAction::DeleteForEveryone { .. } => "DeleteForEveryone",
            AppAction::ClearConversation { .. } => "ClearConversation",
            AppAction::ViewportChanged { .. } => "ViewportChanged",
            AppAction::LoadOlderMessages { .. } => "LoadOlderMessages",
            AppAction::SetDraft { .. } => "SetDraft",
            AppAction::UnlockChat { .. } => "UnlockChat",
            AppAction::ForgotChatPassword { .. } => "ForgotChatPassword",
            AppAction::BeginCheckout { .. } => "BeginCheckout",
            AppAction::DismissCheckout => "DismissCheckout",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
