//! Domain models shared between the server and Rust clients.

pub mod conversation;
pub mod frame;
pub mod message;
pub mod timestamp;

pub use conversation::{Conversation, CreateConversationRequest};
pub use frame::{ClientFrame, MessagePayload, ServerFrame};
pub use message::{CreateMessageRequest, Message};
pub use timestamp::Timestamp;
