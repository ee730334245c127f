//! In-memory persistence gateway fake for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use shared::models::message::CreateMessageRequest;
use shared::models::{Conversation, Message, Timestamp};

use super::persistence::{GatewayError, PersistenceGateway};

#[derive(Default)]
struct InMemoryState {
    participants: HashMap<i64, Vec<i64>>,
    messages: HashMap<i64, Message>,
    last_message_times: HashMap<i64, Timestamp>,
    next_message_id: i64,
    next_conversation_id: i64,
}

/// Gateway fake backed by hash maps, with call counters for asserting
/// persistence discipline (e.g. relay-only paths never create messages).
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<InMemoryState>,
    create_calls: AtomicUsize,
}

impl InMemoryGateway {
    /// Creates an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a conversation with the given participants.
    pub async fn add_conversation(&self, conversation_id: i64, participants: &[i64]) {
        let mut state = self.state.lock().await;
        state
            .participants
            .insert(conversation_id, participants.to_vec());
        state.next_conversation_id = state.next_conversation_id.max(conversation_id);
    }

    /// Seeds a stored message, returning it for convenience.
    pub async fn seed_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        text: &str,
    ) -> Message {
        let mut state = self.state.lock().await;
        state.next_message_id += 1;
        let message = Message {
            id: state.next_message_id,
            conversation_id,
            sender_id,
            text: text.to_string(),
            read: false,
            created_at: Timestamp::now(),
        };
        state.messages.insert(message.id, message.clone());
        message
    }

    /// Number of `create_message` calls observed.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Fetches a stored message by id.
    pub async fn stored_message(&self, message_id: i64) -> Option<Message> {
        self.state.lock().await.messages.get(&message_id).cloned()
    }

    /// Whether the conversation's last-message timestamp was bumped.
    pub async fn last_message_time(&self, conversation_id: i64) -> Option<Timestamp> {
        self.state
            .lock()
            .await
            .last_message_times
            .get(&conversation_id)
            .copied()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn get_conversation_participants(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<i64>, GatewayError> {
        Ok(self
            .state
            .lock()
            .await
            .participants
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> Result<Message, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.next_message_id += 1;
        let message = Message {
            id: state.next_message_id,
            conversation_id: request.conversation_id,
            sender_id: request.sender_id,
            text: request.text,
            read: false,
            created_at: Timestamp::now(),
        };
        state.messages.insert(message.id, message.clone());
        Ok(message)
    }

    async fn update_conversation_last_message_time(
        &self,
        conversation_id: i64,
    ) -> Result<(), GatewayError> {
        self.state
            .lock()
            .await
            .last_message_times
            .insert(conversation_id, Timestamp::now());
        Ok(())
    }

    async fn mark_message_as_read(
        &self,
        message_id: i64,
    ) -> Result<Option<Message>, GatewayError> {
        let mut state = self.state.lock().await;
        Ok(state.messages.get_mut(&message_id).map(|message| {
            message.read = true;
            message.clone()
        }))
    }

    async fn get_or_create_direct_conversation(
        &self,
        user_a: i64,
        user_b: i64,
    ) -> Result<Conversation, GatewayError> {
        let mut state = self.state.lock().await;

        let existing = state.participants.iter().find_map(|(id, members)| {
            (members.contains(&user_a) && members.contains(&user_b)).then_some(*id)
        });

        let id = if let Some(id) = existing {
            id
        } else {
            state.next_conversation_id += 1;
            let id = state.next_conversation_id;
            state.participants.insert(id, vec![user_a, user_b]);
            id
        };

        Ok(Conversation {
            id,
            last_message_at: state.last_message_times.get(&id).copied(),
            created_at: Timestamp::now(),
        })
    }

    async fn get_conversation_messages(
        &self,
        conversation_id: i64,
    ) -> Result<Vec<Message>, GatewayError> {
        let state = self.state.lock().await;
        let mut messages: Vec<Message> = state
            .messages
            .values()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.id);
        Ok(messages)
    }
}
