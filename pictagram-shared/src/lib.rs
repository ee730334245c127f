#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)]

//! Shared types for the PICTagram platform: configuration, domain models,
//! the realtime wire protocol, and the client-side dedup helper.

pub mod config;
pub mod models;
pub mod realtime;
