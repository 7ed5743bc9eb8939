//! Core types for Toolweave: transcript entries, configuration, and
//! persisted session history.

pub mod config;
pub mod session;
pub mod types;
pub mod utils;
