//! Targeted delivery of conversation events.

use std::sync::Arc;

use shared::models::{Message, MessagePayload, ServerFrame};
use tracing::debug;

use super::registry::SessionRegistry;
use crate::services::persistence::{GatewayError, PersistenceGateway};

/// Builds the relay frame for a stored message.
///
/// Used by both write paths (socket-persisted and REST-persisted) so
/// receivers cannot distinguish the origin.
#[must_use]
pub fn new_message_frame(message: &Message) -> ServerFrame {
    ServerFrame::NewMessage {
        message: MessagePayload::from(message),
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        message_id: message.id,
    }
}

/// Pure lookup-and-push router for point-to-point events.
///
/// No retry and no queue: an offline recipient simply receives nothing
/// over the realtime path and catches up via its next REST poll.
#[derive(Clone)]
pub struct DeliveryRouter {
    registry: Arc<SessionRegistry>,
    gateway: Arc<dyn PersistenceGateway>,
}

impl DeliveryRouter {
    /// Creates a router over the given registry and gateway.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { registry, gateway }
    }

    /// Pushes `frame` to every connected participant of the conversation
    /// except `exclude_user_id`, returning the number delivered.
    ///
    /// A registry miss is not an error, just an offline recipient.
    ///
    /// # Errors
    /// Returns a [`GatewayError`] if the participant lookup fails.
    pub async fn relay_to_participants(
        &self,
        conversation_id: i64,
        exclude_user_id: i64,
        frame: &ServerFrame,
    ) -> Result<usize, GatewayError> {
        let participants = self
            .gateway
            .get_conversation_participants(conversation_id)
            .await?;

        let mut delivered = 0;
        for participant in participants {
            if participant == exclude_user_id {
                continue;
            }

            if let Some(connection) = self.registry.resolve(participant).await {
                connection.send(frame.clone());
                delivered += 1;
            } else {
                debug!(conversation_id, participant, "recipient offline, skipping relay");
            }
        }

        metrics::counter!("realtime_relays_total").increment(delivered as u64);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::ConnectionManager;
    use crate::services::persistence::OfflineGateway;
    use crate::services::test_support::InMemoryGateway;

    #[tokio::test]
    async fn relays_only_to_connected_non_senders() {
        let manager = ConnectionManager::new(8);
        let registry = Arc::new(SessionRegistry::new());
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_conversation(7, &[1, 2, 3]).await;

        let (sender_conn, mut sender_rx) = manager.accept(None).await;
        let (recipient_conn, mut recipient_rx) = manager.accept(None).await;
        registry.bind(1, sender_conn).await;
        registry.bind(2, recipient_conn).await;
        // User 3 never connects.

        let _ = sender_rx.recv().await;
        let _ = recipient_rx.recv().await;

        let router = DeliveryRouter::new(Arc::clone(&registry), gateway);
        let frame = ServerFrame::MessageRead {
            message_id: 9,
            conversation_id: 7,
            read_by: 2,
        };

        let delivered = router
            .relay_to_participants(7, 1, &frame)
            .await
            .expect("relay should succeed");

        assert_eq!(delivered, 1);
        assert_eq!(recipient_rx.recv().await, Some(frame));
        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_as_error() {
        let registry = Arc::new(SessionRegistry::new());
        let router = DeliveryRouter::new(registry, Arc::new(OfflineGateway));

        let result = router
            .relay_to_participants(7, 1, &ServerFrame::MessageReadConfirmed { message_id: 1 })
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn unknown_conversation_relays_to_nobody() {
        let registry = Arc::new(SessionRegistry::new());
        let router = DeliveryRouter::new(registry, Arc::new(InMemoryGateway::new()));

        let delivered = router
            .relay_to_participants(99, 1, &ServerFrame::MessageReadConfirmed { message_id: 1 })
            .await
            .expect("empty participant list is not an error");
        assert_eq!(delivered, 0);
    }
}
