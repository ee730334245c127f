use axum::{
    Router,
    routing::post,
};

use crate::handlers::messages::{create_conversation, list_messages, post_message};

/// Conversation and message endpoints under `/api`.
pub fn create_messages_router() -> Router {
    Router::new()
        .route("/conversations", post(create_conversation))
        .route(
            "/conversations/{conversation_id}/messages",
            post(post_message).get(list_messages),
        )
}
