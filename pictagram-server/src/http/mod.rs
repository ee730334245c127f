//! HTTP error types shared by the REST handlers.

pub mod error;
pub mod problem;
