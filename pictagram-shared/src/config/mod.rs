//! # Configuration
//!
//! Configuration structures and loading for the PICTagram server.

pub mod server;
