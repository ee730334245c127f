//! Inbound frame routing for the realtime channel.
//!
//! Each connection moves one way from unauthenticated to authenticated;
//! closing the channel is the only way out. Unauthenticated connections
//! may still submit any frame — routing is keyed by participant ids
//! resolved from the persistence gateway, not by the sender's session,
//! so an unbound sender simply receives no targeted replies. This
//! mirrors the REST path, which enforces no session either; see
//! DESIGN.md for the policy decision.

use std::sync::Arc;

use chrono::Utc;
use shared::models::message::CreateMessageRequest;
use shared::models::{ClientFrame, Message, MessagePayload, ServerFrame};
use tracing::{debug, warn};

use super::connection::{ConnectionHandle, ConnectionManager};
use super::registry::SessionRegistry;
use super::router::{DeliveryRouter, new_message_frame};
use crate::services::persistence::{GatewayError, PersistenceGateway};

/// How a `new_message` payload is to be handled.
enum MessageDisposition {
    /// Payload carries an id: already persisted, pure routing.
    Relay {
        id: i64,
        conversation_id: i64,
        sender_id: i64,
    },
    /// Payload has no id: persist first, then relay and confirm.
    Persist {
        conversation_id: i64,
        sender_id: i64,
        text: String,
    },
    /// Required fields missing for either path.
    Invalid,
}

fn classify(payload: &MessagePayload) -> MessageDisposition {
    match (payload.id, payload.conversation_id, payload.sender_id) {
        (Some(id), Some(conversation_id), Some(sender_id)) => MessageDisposition::Relay {
            id,
            conversation_id,
            sender_id,
        },
        (None, Some(conversation_id), Some(sender_id)) => match payload.text.clone() {
            Some(text) => MessageDisposition::Persist {
                conversation_id,
                sender_id,
                text,
            },
            None => MessageDisposition::Invalid,
        },
        _ => MessageDisposition::Invalid,
    }
}

/// Routes parsed frames to their side effects and reply contracts.
pub struct Dispatcher {
    manager: Arc<ConnectionManager>,
    registry: Arc<SessionRegistry>,
    router: DeliveryRouter,
    gateway: Arc<dyn PersistenceGateway>,
}

impl Dispatcher {
    /// Wires the dispatcher to the relay's components.
    #[must_use]
    pub fn new(
        manager: Arc<ConnectionManager>,
        registry: Arc<SessionRegistry>,
        router: DeliveryRouter,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            manager,
            registry,
            router,
            gateway,
        }
    }

    /// Handles one inbound frame from `connection`.
    ///
    /// Persistence failures are converted to typed failure frames sent
    /// only to the originator; nothing here propagates an error that
    /// could take down the connection or the process.
    pub async fn handle_frame(&self, connection: &ConnectionHandle, frame: ClientFrame) {
        connection.touch();
        metrics::counter!("realtime_frames_received_total").increment(1);

        match frame {
            ClientFrame::Authenticate { user_id } => {
                self.handle_authenticate(connection, user_id).await;
            }
            ClientFrame::Ping => {
                connection.send(ServerFrame::Pong {
                    timestamp: Utc::now().timestamp_millis(),
                });
            }
            ClientFrame::Like { post_id, likes } => {
                self.manager
                    .broadcast_except(connection.id(), &ServerFrame::Like { post_id, likes })
                    .await;
            }
            ClientFrame::Bookmark {
                post_id,
                user_id,
                bookmarked,
            } => {
                self.manager
                    .broadcast_except(
                        connection.id(),
                        &ServerFrame::Bookmark {
                            post_id,
                            user_id,
                            bookmarked,
                        },
                    )
                    .await;
            }
            ClientFrame::NewComment { post_id, comment } => {
                self.manager
                    .broadcast_except(
                        connection.id(),
                        &ServerFrame::NewComment { post_id, comment },
                    )
                    .await;
            }
            ClientFrame::NewMessage { message, .. } => {
                self.handle_new_message(connection, message).await;
            }
            ClientFrame::MessageRead {
                message_id,
                user_id,
            } => {
                self.handle_message_read(connection, message_id, user_id)
                    .await;
            }
        }
    }

    async fn handle_authenticate(&self, connection: &ConnectionHandle, user_id: i64) {
        self.registry.bind(user_id, connection.clone()).await;
        debug!(user_id, connection_id = connection.id(), "connection authenticated");
        connection.send(ServerFrame::Authenticated {
            user_id,
            success: true,
        });
    }

    async fn handle_new_message(&self, connection: &ConnectionHandle, payload: MessagePayload) {
        match classify(&payload) {
            MessageDisposition::Relay {
                id,
                conversation_id,
                sender_id,
            } => {
                self.relay_existing_message(connection, payload, id, conversation_id, sender_id)
                    .await;
            }
            MessageDisposition::Persist {
                conversation_id,
                sender_id,
                text,
            } => {
                self.persist_and_relay_message(connection, conversation_id, sender_id, text)
                    .await;
            }
            MessageDisposition::Invalid => {
                connection.send(ServerFrame::MessageSent {
                    success: false,
                    message: None,
                    message_id: None,
                    error: Some("Invalid message data".to_string()),
                });
            }
        }
    }

    /// Routes an already-persisted message to its recipients without
    /// writing anything.
    async fn relay_existing_message(
        &self,
        connection: &ConnectionHandle,
        payload: MessagePayload,
        message_id: i64,
        conversation_id: i64,
        sender_id: i64,
    ) {
        let frame = ServerFrame::NewMessage {
            message: payload,
            conversation_id,
            sender_id,
            message_id,
        };

        if let Err(err) = self
            .router
            .relay_to_participants(conversation_id, sender_id, &frame)
            .await
        {
            warn!(conversation_id, message_id, error = %err, "relay of existing message failed");
            connection.send(message_sent_failure(&err));
        }
    }

    /// Persists a new message, bumps the conversation timestamp, relays
    /// to recipients, and confirms the sender. Any failure before the
    /// confirmation turns into a `message_sent` failure frame for the
    /// sender alone; no relay is attempted after a failed write.
    async fn persist_and_relay_message(
        &self,
        connection: &ConnectionHandle,
        conversation_id: i64,
        sender_id: i64,
        text: String,
    ) {
        let stored = match self.store_message(conversation_id, sender_id, text).await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(conversation_id, sender_id, error = %err, "message persistence failed");
                connection.send(message_sent_failure(&err));
                return;
            }
        };

        let frame = new_message_frame(&stored);
        if let Err(err) = self
            .router
            .relay_to_participants(conversation_id, sender_id, &frame)
            .await
        {
            // The message is durable; only the realtime notification was
            // lost. Recipients catch up on their next poll.
            warn!(conversation_id, message_id = stored.id, error = %err, "relay after persist failed");
        }

        // The success confirmation is targeted through the sender's
        // session rather than the raw channel: an unregistered sender
        // receives nothing, matching the targeted-reply routing of the
        // rest of the point-to-point protocol.
        if let Some(sender) = self.registry.resolve(sender_id).await {
            sender.send(ServerFrame::MessageSent {
                success: true,
                message: Some(MessagePayload::from(&stored)),
                message_id: Some(stored.id),
                error: None,
            });
        }
    }

    async fn store_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        text: String,
    ) -> Result<Message, GatewayError> {
        let stored = self
            .gateway
            .create_message(CreateMessageRequest {
                conversation_id,
                sender_id,
                text,
            })
            .await?;

        self.gateway
            .update_conversation_last_message_time(conversation_id)
            .await?;

        Ok(stored)
    }

    /// Marks a message read and fans the receipt back to its sender.
    ///
    /// The original sender is resolved from the stored message, never
    /// from a caller-supplied field, closing the impersonation vector.
    async fn handle_message_read(
        &self,
        connection: &ConnectionHandle,
        message_id: i64,
        reader_id: i64,
    ) {
        match self.gateway.mark_message_as_read(message_id).await {
            Ok(Some(message)) => {
                if message.sender_id != reader_id
                    && let Some(sender) = self.registry.resolve(message.sender_id).await
                {
                    sender.send(ServerFrame::MessageRead {
                        message_id,
                        conversation_id: message.conversation_id,
                        read_by: reader_id,
                    });
                }

                connection.send(ServerFrame::MessageReadConfirmed { message_id });
            }
            Ok(None) => {
                connection.send(ServerFrame::MessageReadError {
                    message_id,
                    error: "Message not found".to_string(),
                });
            }
            Err(err) => {
                warn!(message_id, reader_id, error = %err, "mark-as-read failed");
                connection.send(ServerFrame::MessageReadError {
                    message_id,
                    error: err.to_string(),
                });
            }
        }
    }
}

fn message_sent_failure(err: &GatewayError) -> ServerFrame {
    ServerFrame::MessageSent {
        success: false,
        message: None,
        message_id: None,
        error: Some(err.to_string()),
    }
}
