pub mod anthropic;
pub mod sanitize;

use crate::types::{Completion, CompletionEvent, CompletionRequest, RequestOptions};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The provider reported a failure inside an otherwise successful stream.
    #[error("Stream error ({kind}): {message}")]
    Stream { kind: String, message: String },

    /// The connection closed before the provider signalled completion.
    #[error("Stream truncated: {0}")]
    Truncated(String),

    #[error("{0}")]
    Other(String),
}

/// A remote text-completion service.
///
/// One call to either method is one network request; implementations never
/// retry on their own.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Run a completion and return the whole response.
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> Result<Completion, ProviderError>;

    /// Stream a completion. The stream ends after a `Done` event or the first error.
    fn stream(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>>;
}
