//! Model transport for Toolweave.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`] — trait that all providers implement
//! - [`reply`] — typed classification of a raw completion into [`ModelReply`]
//! - [`sse`] — line framing for streamed completions
//! - [`registry`] — static specs for the supported providers + matching logic
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible HTTP client
//! - [`http_provider::create_provider`] — convenience builder from model name + config

pub mod error;
pub mod http_provider;
pub mod registry;
pub mod reply;
pub mod sse;
pub mod traits;

// Re-export main types for convenience
pub use error::ProviderError;
pub use http_provider::{create_provider, HttpProvider};
pub use registry::{ProviderConfig, ProviderSpec, PROVIDERS};
pub use reply::{classify, FinalAnswerPolicy, ModelReply};
pub use traits::{LlmProvider, LlmRequestConfig};
