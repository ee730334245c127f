//! Realtime message/notification relay subsystem.
//!
//! The relay owns the physical WebSocket channels (connection manager),
//! the user-to-connection bindings (session registry), the inbound frame
//! state machine (dispatcher), and the targeted fan-out of conversation
//! events (delivery router). All presence state is in-memory and rebuilt
//! from nothing on process restart.

pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod router;

use std::sync::Arc;

use shared::config::server::RealtimeConfig;
use shared::models::Message;
use tracing::warn;

use crate::services::persistence::PersistenceGateway;
use connection::{ConnectionHandle, ConnectionManager};
use dispatcher::Dispatcher;
use registry::SessionRegistry;
use router::DeliveryRouter;

/// Shared handle to the relay subsystem, constructed once per process.
pub type SharedRelay = Arc<Relay>;

/// Top-level controller owning the realtime components.
pub struct Relay {
    manager: Arc<ConnectionManager>,
    registry: Arc<SessionRegistry>,
    router: DeliveryRouter,
    dispatcher: Dispatcher,
}

impl Relay {
    /// Builds the relay with its connection manager, session registry,
    /// dispatcher, and delivery router wired to the given gateway.
    #[must_use]
    pub fn new(config: &RealtimeConfig, gateway: Arc<dyn PersistenceGateway>) -> Self {
        let manager = Arc::new(ConnectionManager::new(config.channel_capacity));
        let registry = Arc::new(SessionRegistry::new());
        let router = DeliveryRouter::new(Arc::clone(&registry), Arc::clone(&gateway));
        let dispatcher = Dispatcher::new(
            Arc::clone(&manager),
            Arc::clone(&registry),
            router.clone(),
            gateway,
        );

        Self {
            manager,
            registry,
            router,
            dispatcher,
        }
    }

    /// The connection manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The protocol dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Removes a closed connection and unbinds any session it carried.
    pub async fn disconnect(&self, handle: &ConnectionHandle) {
        self.manager.remove(handle).await;
        self.registry.unbind(handle).await;
    }

    /// Fans a freshly persisted message out to its connected recipients.
    ///
    /// Called by the REST layer after it has already durably written the
    /// message, so failures here only cost the realtime notification; the
    /// recipient still sees the message on its next poll.
    pub fn notify_message_created(&self, message: &Message) {
        let frame = router::new_message_frame(message);
        let conversation_id = message.conversation_id;
        let sender_id = message.sender_id;
        let router = self.router.clone();

        tokio::spawn(async move {
            if let Err(err) = router
                .relay_to_participants(conversation_id, sender_id, &frame)
                .await
            {
                warn!(conversation_id, error = %err, "failed to relay persisted message");
            }
        });
    }
}
