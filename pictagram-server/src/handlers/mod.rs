//! Request handlers for the REST API and the realtime channel.

pub mod messages;
pub mod realtime;
