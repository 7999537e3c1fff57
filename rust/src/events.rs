use serde::{Deserialize, Serialize};

use crate::state::{Call, Message};

/// Closed tagged union of push-channel events, validated at the transport
/// boundary. The socket layer hands raw frames to [`parse_push_frame`];
/// anything that does not deserialize into one of these tags is rejected
/// there with a warn log instead of leaking string-keyed events inward.
///
/// Every event may be redelivered; all consumers handle them idempotently.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// A message was created or mutated (edit, react, pin, star, tombstone).
    CommentUpdated {
        conversation_id: String,
        message: Message,
    },
    MessageDelivered {
        conversation_id: String,
        message_ids: Vec<String>,
        user_id: String,
    },
    MessageRead {
        conversation_id: String,
        message_ids: Vec<String>,
        user_id: String,
    },
    /// Another session of the same user cleared the conversation.
    ClearedForUser {
        conversation_id: String,
        user_id: String,
        cleared_at: i64,
    },
    /// Another session of the same user removed messages for themselves.
    RemovedForUser {
        conversation_id: String,
        user_id: String,
        message_ids: Vec<String>,
    },
    AppointmentCreated {
        conversation_id: String,
        appointment_id: String,
        status: String,
    },
    AppointmentUpdated {
        conversation_id: String,
        appointment_id: String,
        status: String,
    },
    CallEnded {
        conversation_id: String,
        call: Call,
    },
    Typing {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
    OnlineStatus {
        user_id: String,
        online: bool,
    },
}

impl PushEvent {
    /// Conversation scope, if the event is conversation-scoped.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            PushEvent::CommentUpdated {
                conversation_id, ..
            }
            | PushEvent::MessageDelivered {
                conversation_id, ..
            }
            | PushEvent::MessageRead {
                conversation_id, ..
            }
            | PushEvent::ClearedForUser {
                conversation_id, ..
            }
            | PushEvent::RemovedForUser {
                conversation_id, ..
            }
            | PushEvent::AppointmentCreated {
                conversation_id, ..
            }
            | PushEvent::AppointmentUpdated {
                conversation_id, ..
            }
            | PushEvent::CallEnded {
                conversation_id, ..
            }
            | PushEvent::Typing {
                conversation_id, ..
            } => Some(conversation_id),
            PushEvent::OnlineStatus { .. } => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PushEvent::CommentUpdated { .. } => "comment_updated",
            PushEvent::MessageDelivered { .. } => "message_delivered",
            PushEvent::MessageRead { .. } => "message_read",
            PushEvent::ClearedForUser { .. } => "cleared_for_user",
            PushEvent::RemovedForUser { .. } => "removed_for_user",
            PushEvent::AppointmentCreated { .. } => "appointment_created",
            PushEvent::AppointmentUpdated { .. } => "appointment_updated",
            PushEvent::CallEnded { .. } => "call_ended",
            PushEvent::Typing { .. } => "typing",
            PushEvent::OnlineStatus { .. } => "online_status",
        }
    }
}

pub fn parse_push_frame(frame: &str) -> Result<PushEvent, serde_json::Error> {
    serde_json::from_str(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_frames() {
        let frame = r#"{
            "type": "message_read",
            "conversation_id": "c1",
            "message_ids": ["m1", "m2"],
            "user_id": "buyer"
        }"#;
        let ev = parse_push_frame(frame).unwrap();
        assert_eq!(ev.tag(), "message_read");
        assert_eq!(ev.conversation_id(), Some("c1"));
    }

    #[test]
    fn rejects_unknown_tags_at_the_boundary() {
        let frame = r#"{"type": "mystery_event", "conversation_id": "c1"}"#;
        assert!(parse_push_frame(frame).is_err());
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(parse_push_frame("not json").is_err());
        assert!(parse_push_frame(r#"{"type": "typing"}"#).is_err());
    }

    #[test]
    fn online_status_is_user_scoped() {
        let frame = r#"{"type": "online_status", "user_id": "seller", "online": true}"#;
        let ev = parse_push_frame(frame).unwrap();
        assert_eq!(ev.conversation_id(), None);
    }
}
