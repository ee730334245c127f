use serde::{Deserialize, Serialize};

use super::Timestamp;

/// A direct conversation between two users.
///
/// Created lazily the first time two users exchange messages and never
/// deleted by the relay subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier for the conversation.
    pub id: i64,

    /// Timestamp of the most recent message, if any.
    pub last_message_at: Option<Timestamp>,

    /// Timestamp when the conversation was created.
    pub created_at: Timestamp,
}

/// Request structure for opening (or reusing) a direct conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// The two participants of the conversation.
    pub participant_ids: Vec<i64>,
}
