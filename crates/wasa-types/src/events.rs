use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ConversationResponse, MessageResponse, ReactionResponse};

/// Events pushed from server to client over the push channel.
///
/// Serialized as `{"type": "<snake_case name>", "payload": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum PushEvent {
    /// A message was sent or forwarded into a conversation
    NewMessage(MessageResponse),

    /// List-view snippet refresh for a conversation
    ConversationUpdated {
        conversation_id: String,
        last_message_snippet: Option<String>,
        last_message_is_photo: bool,
        last_message_at: DateTime<Utc>,
    },

    /// A participant opened the conversation. `fully_read_message_ids` are the
    /// messages that became `read` for every recipient as a result.
    MessagesRead {
        conversation_id: String,
        read_by_user_id: String,
        fully_read_message_ids: Vec<String>,
    },

    ReactionAdded {
        conversation_id: String,
        message_id: String,
        reaction: ReactionResponse,
    },

    ReactionRemoved {
        conversation_id: String,
        message_id: String,
        reaction_id: String,
        user_id: String,
    },

    ProfileUpdated {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        photo_url: Option<String>,
    },

    GroupUpdated {
        group_id: String,
        name: String,
        photo_url: Option<String>,
    },

    /// The receiving user became a participant of a conversation
    NewConversation(ConversationResponse),

    /// The sender deleted a message
    MessageDeleted {
        conversation_id: String,
        message_id: String,
    },
}

impl PushEvent {
    /// Wire name of the event, as found in the `type` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new_message",
            Self::ConversationUpdated { .. } => "conversation_updated",
            Self::MessagesRead { .. } => "messages_read",
            Self::ReactionAdded { .. } => "reaction_added",
            Self::ReactionRemoved { .. } => "reaction_removed",
            Self::ProfileUpdated { .. } => "profile_updated",
            Self::GroupUpdated { .. } => "group_updated",
            Self::NewConversation(_) => "new_conversation",
            Self::MessageDeleted { .. } => "message_deleted",
        }
    }

    /// Serialize into a single text frame.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn frames_are_type_and_payload() {
        let event = PushEvent::MessagesRead {
            conversation_id: "c1".into(),
            read_by_user_id: "u2".into(),
            fully_read_message_ids: vec!["m1".into(), "m2".into()],
        };
        let frame: Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({
                "type": "messages_read",
                "payload": {
                    "conversationId": "c1",
                    "readByUserId": "u2",
                    "fullyReadMessageIds": ["m1", "m2"],
                }
            })
        );
    }

    #[test]
    fn group_update_keeps_null_photo() {
        let event = PushEvent::GroupUpdated {
            group_id: "g".into(),
            name: "climbing".into(),
            photo_url: None,
        };
        let frame: Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["type"], "group_updated");
        assert_eq!(frame["payload"]["photoUrl"], Value::Null);
        assert_eq!(frame["payload"]["groupId"], "g");
    }

    #[test]
    fn name_matches_serialized_type() {
        let event = PushEvent::ReactionRemoved {
            conversation_id: "c".into(),
            message_id: "m".into(),
            reaction_id: "r".into(),
            user_id: "u".into(),
        };
        let frame: Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["type"], event.name());

        let parsed: PushEvent = serde_json::from_value(frame).unwrap();
        assert!(matches!(parsed, PushEvent::ReactionRemoved { reaction_id, .. } if reaction_id == "r"));
    }
}
