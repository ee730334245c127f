#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! PICTagram backend server.
//!
//! Hosts the REST API and the realtime relay subsystem: the WebSocket
//! connection manager, the user session registry, the protocol
//! dispatcher, and the targeted delivery router layered over the
//! persistence gateway.

pub mod app_state;
pub mod db;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;
pub mod services;
pub mod tracer;
