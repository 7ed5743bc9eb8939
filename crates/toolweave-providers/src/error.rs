use thiserror::Error;

/// Failure of a model request. The conversation loop turns these into a
/// `"Model request failed: ..."` turn result.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no configured provider for model '{0}'; set an API key (e.g. TOOLWEAVE_PROVIDERS__DEEPSEEK__API_KEY)")]
    NotConfigured(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("response contained no choices")]
    Empty,
}
