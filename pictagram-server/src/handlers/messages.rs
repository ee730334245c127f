//! REST cooperation layer for direct messaging.
//!
//! The REST path persists first and then hands the stored message to the
//! relay for asynchronous fan-out, so connected peers learn of the change
//! without polling while offline peers catch up via the list endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
};
use shared::models::message::CreateMessageRequest;
use shared::models::{Conversation, CreateConversationRequest, Message};
use serde::Deserialize;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    realtime::SharedRelay,
    services::persistence::{GatewayError, PersistenceGateway},
};

/// Body of `POST /api/conversations/{conversation_id}/messages`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// The sending user.
    pub sender_id: i64,
    /// The message body.
    pub text: String,
}

fn gateway(state: &AppState) -> AppResult<Arc<dyn PersistenceGateway>> {
    state
        .gateway
        .clone()
        .ok_or_else(|| ApiError::service_unavailable("no database configured"))
}

/// Opens (or reuses) the direct conversation between two users.
///
/// # Errors
/// Returns an [`ApiError`] on validation failure or when the gateway is
/// unavailable.
pub async fn create_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateConversationRequest>,
) -> AppResult<(StatusCode, Json<Conversation>)> {
    let [user_a, user_b] = request.participant_ids[..] else {
        return Err(ApiError::bad_request(
            "exactly two participant ids are required",
        ));
    };
    if user_a == user_b {
        return Err(ApiError::bad_request("participants must be distinct"));
    }

    let conversation = gateway(&state)?
        .get_or_create_direct_conversation(user_a, user_b)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Persists a message and spawns the realtime fan-out.
///
/// # Errors
/// Returns an [`ApiError`] when the conversation does not exist, the
/// sender is not a participant, or persistence fails.
pub async fn post_message(
    Extension(state): Extension<Arc<AppState>>,
    Extension(relay): Extension<SharedRelay>,
    Path(conversation_id): Path<i64>,
    Json(request): Json<PostMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let gateway = gateway(&state)?;

    let participants = gateway
        .get_conversation_participants(conversation_id)
        .await?;
    if participants.is_empty() {
        return Err(ApiError::from(GatewayError::NotFound(format!(
            "conversation {conversation_id} not found"
        ))));
    }
    if !participants.contains(&request.sender_id) {
        return Err(ApiError::bad_request(
            "sender is not a participant of this conversation",
        ));
    }

    let stored = gateway
        .create_message(CreateMessageRequest {
            conversation_id,
            sender_id: request.sender_id,
            text: request.text,
        })
        .await?;
    gateway
        .update_conversation_last_message_time(conversation_id)
        .await?;

    // Durable write done; the realtime notification is best-effort.
    relay.notify_message_created(&stored);

    Ok((StatusCode::CREATED, Json(stored)))
}

/// Lists a conversation's messages, the polling fallback for recipients
/// that were offline during relay.
///
/// # Errors
/// Returns an [`ApiError`] when the gateway is unavailable or the query
/// fails.
pub async fn list_messages(
    Extension(state): Extension<Arc<AppState>>,
    Path(conversation_id): Path<i64>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = gateway(&state)?
        .get_conversation_messages(conversation_id)
        .await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::Relay;
    use crate::services::test_support::InMemoryGateway;
    use shared::config::server::{Config, Profile};

    fn test_state(gateway: Arc<InMemoryGateway>) -> (Arc<AppState>, SharedRelay) {
        let config = Config::default_for_profile(Profile::Test);
        let gateway_dyn: Arc<dyn PersistenceGateway> = gateway;
        let relay = Arc::new(Relay::new(&config.realtime, Arc::clone(&gateway_dyn)));
        let state = Arc::new(AppState {
            pool: None,
            gateway: Some(gateway_dyn),
        });
        (state, relay)
    }

    #[tokio::test]
    async fn post_message_persists_and_notifies_connected_recipient() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_conversation(7, &[1, 2]).await;
        let (state, relay) = test_state(Arc::clone(&gateway));

        // Recipient connects and authenticates.
        let (conn, mut rx) = relay.manager().accept(None).await;
        let _ = rx.recv().await;
        relay.registry().bind(2, conn).await;

        let (status, Json(stored)) = post_message(
            Extension(state),
            Extension(Arc::clone(&relay)),
            Path(7),
            Json(PostMessageRequest {
                sender_id: 1,
                text: "hi".to_string(),
            }),
        )
        .await
        .expect("post should succeed");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(stored.conversation_id, 7);
        assert_eq!(gateway.create_calls(), 1);
        assert!(gateway.last_message_time(7).await.is_some());

        // The spawned relay delivers the frame to the recipient.
        let relayed = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("relay within deadline")
            .expect("relay frame");
        assert!(matches!(
            relayed,
            shared::models::ServerFrame::NewMessage { message_id, .. } if message_id == stored.id
        ));
    }

    #[tokio::test]
    async fn post_message_to_unknown_conversation_is_not_found() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (state, relay) = test_state(gateway);

        let result = post_message(
            Extension(state),
            Extension(relay),
            Path(99),
            Json(PostMessageRequest {
                sender_id: 1,
                text: "hi".to_string(),
            }),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn post_message_from_non_participant_is_rejected() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_conversation(7, &[1, 2]).await;
        let (state, relay) = test_state(Arc::clone(&gateway));

        let result = post_message(
            Extension(state),
            Extension(relay),
            Path(7),
            Json(PostMessageRequest {
                sender_id: 3,
                text: "hi".to_string(),
            }),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn create_conversation_requires_two_distinct_participants() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (state, _relay) = test_state(gateway);

        let result = create_conversation(
            Extension(Arc::clone(&state)),
            Json(CreateConversationRequest {
                participant_ids: vec![1],
            }),
        )
        .await;
        assert!(result.is_err());

        let result = create_conversation(
            Extension(state),
            Json(CreateConversationRequest {
                participant_ids: vec![1, 1],
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn create_conversation_is_idempotent_per_pair() {
        let gateway = Arc::new(InMemoryGateway::new());
        let (state, _relay) = test_state(gateway);

        let (_, Json(first)) = create_conversation(
            Extension(Arc::clone(&state)),
            Json(CreateConversationRequest {
                participant_ids: vec![1, 2],
            }),
        )
        .await
        .expect("create should succeed");

        let (_, Json(second)) = create_conversation(
            Extension(state),
            Json(CreateConversationRequest {
                participant_ids: vec![1, 2],
            }),
        )
        .await
        .expect("create should succeed");

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn list_messages_returns_creation_order() {
        let gateway = Arc::new(InMemoryGateway::new());
        gateway.add_conversation(7, &[1, 2]).await;
        gateway.seed_message(7, 1, "first").await;
        gateway.seed_message(7, 2, "second").await;
        let (state, _relay) = test_state(gateway);

        let Json(messages) = list_messages(Extension(state), Path(7))
            .await
            .expect("list should succeed");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
    }
}
