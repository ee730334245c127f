//! Wire protocol for the realtime channel.
//!
//! Every frame is a JSON object discriminated by a `type` field. Field
//! names are camelCase on the wire. Inbound and outbound frames are
//! separate enums so the dispatcher can match exhaustively on each side.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;

/// The message body carried inside `new_message` frames.
///
/// All fields are optional at the parse level: a payload carrying an `id`
/// describes an already-persisted message being relayed, while a payload
/// without one asks the relay to persist first. Field validation happens
/// in the dispatcher, not during deserialization, so a malformed payload
/// is answered with a typed failure frame instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Identifier of an already-persisted message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Conversation the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,

    /// User who sent the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,

    /// The message body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Read flag, present when relaying a stored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,

    /// Creation timestamp, present when relaying a stored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<super::Timestamp>,
}

impl From<&Message> for MessagePayload {
    fn from(message: &Message) -> Self {
        Self {
            id: Some(message.id),
            conversation_id: Some(message.conversation_id),
            sender_id: Some(message.sender_id),
            text: Some(message.text.clone()),
            read: Some(message.read),
            created_at: Some(message.created_at),
        }
    }
}

/// Frames sent by clients over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Binds the connection to a user identifier.
    Authenticate {
        /// The user to bind the connection to.
        user_id: i64,
    },
    /// Liveness probe.
    Ping,
    /// A like event to fan out to other viewers.
    Like {
        /// The post that was liked.
        post_id: i64,
        /// The new like count.
        likes: i64,
    },
    /// A bookmark event to fan out to other viewers.
    Bookmark {
        /// The post that was bookmarked.
        post_id: i64,
        /// The user who toggled the bookmark.
        user_id: i64,
        /// The new bookmark state.
        bookmarked: bool,
    },
    /// A comment event to fan out to other viewers.
    NewComment {
        /// The post that was commented on.
        post_id: i64,
        /// The comment body as submitted by the client.
        comment: Value,
    },
    /// A direct message to relay, persisting first when it has no id.
    NewMessage {
        /// The message body.
        message: MessagePayload,
        /// Optional explicit recipient hint; routing uses conversation
        /// participants, so this field is accepted but not relied upon.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recipient_id: Option<i64>,
    },
    /// Marks a message as read.
    MessageRead {
        /// The message that was read.
        message_id: i64,
        /// The user who read it.
        user_id: i64,
    },
}

/// Frames sent by the server over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Acknowledgement emitted on every freshly accepted connection.
    ConnectionEstablished {
        /// Human-readable greeting.
        message: String,
    },
    /// Confirms an `authenticate` frame.
    Authenticated {
        /// The bound user.
        user_id: i64,
        /// Always true; a failed bind never reaches the client.
        success: bool,
    },
    /// Reply to a `ping`.
    Pong {
        /// Server time in milliseconds since the Unix epoch.
        timestamp: i64,
    },
    /// Broadcast of a like event.
    Like {
        /// The post that was liked.
        post_id: i64,
        /// The new like count.
        likes: i64,
    },
    /// Broadcast of a bookmark event.
    Bookmark {
        /// The post that was bookmarked.
        post_id: i64,
        /// The user who toggled the bookmark.
        user_id: i64,
        /// The new bookmark state.
        bookmarked: bool,
    },
    /// Broadcast of a comment event.
    NewComment {
        /// The post that was commented on.
        post_id: i64,
        /// The comment body.
        comment: Value,
    },
    /// Relay of a direct message to a conversation participant.
    NewMessage {
        /// The message body; identical framing whether the message was
        /// persisted by the relay or arrived already stored.
        message: MessagePayload,
        /// The conversation the message belongs to.
        conversation_id: i64,
        /// The sending user.
        sender_id: i64,
        /// The message identifier, duplicated for dedup convenience.
        message_id: i64,
    },
    /// Confirmation (or failure report) sent back to a message sender.
    MessageSent {
        /// Whether the message was persisted and relayed.
        success: bool,
        /// The stored message on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<MessagePayload>,
        /// The stored message id on success.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<i64>,
        /// Failure description on error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Read receipt delivered to the original sender.
    MessageRead {
        /// The message that was read.
        message_id: i64,
        /// The conversation it belongs to.
        conversation_id: i64,
        /// The user who read it.
        read_by: i64,
    },
    /// Confirmation sent back to the reader.
    MessageReadConfirmed {
        /// The message that was marked read.
        message_id: i64,
    },
    /// Failure report sent back to the reader.
    MessageReadError {
        /// The message the mark-as-read failed for.
        message_id: i64,
        /// Failure description.
        error: String,
    },
}
