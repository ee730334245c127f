//! Client-side helpers for consumers of the realtime channel.

pub mod dedup;

pub use dedup::MessageDedup;
