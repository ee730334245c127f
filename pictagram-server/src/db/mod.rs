//! Database bootstrap and health probes.

pub mod bootstrap;
