use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A direct message stored durably in a conversation.
///
/// Immutable after creation except for the read flag, which only ever
/// transitions from `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier for the message.
    pub id: i64,

    /// ID of the conversation this message belongs to.
    pub conversation_id: i64,

    /// ID of the user who sent the message.
    pub sender_id: i64,

    /// The message body.
    pub text: String,

    /// Whether the recipient has read the message.
    pub read: bool,

    /// Timestamp when the message was created.
    pub created_at: Timestamp,
}

/// Request structure for creating a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    /// The conversation to add the message to.
    pub conversation_id: i64,

    /// The user sending the message.
    pub sender_id: i64,

    /// The message body.
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn message_serializes_with_camel_case_fields() {
        let message = Message {
            id: 5,
            conversation_id: 7,
            sender_id: 1,
            text: "hi".to_string(),
            read: false,
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["conversationId"], 7);
        assert_eq!(value["senderId"], 1);
        assert_eq!(value["read"], false);
        assert_eq!(value["createdAt"], "2025-03-08T14:30:00Z");
    }

    #[test]
    fn create_request_round_trips() {
        let request = CreateMessageRequest {
            conversation_id: 7,
            sender_id: 1,
            text: "hello".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: CreateMessageRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, request);
    }
}
