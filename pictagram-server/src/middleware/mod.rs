//! HTTP middleware.

pub mod request_context;
