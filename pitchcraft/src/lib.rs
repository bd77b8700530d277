pub mod config;
pub mod error;
pub mod generator;
pub mod prompt;
pub mod providers;
pub mod retry;
pub mod stream;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::ClientConfig;
pub use error::{AiServiceError, ErrorCode, Retryable, classify};
pub use generator::ProposalGenerator;
pub use prompt::{JsonContractPrompt, Prompt, PromptBuilder};
pub use providers::{Provider, ProviderError};
pub use retry::{RetryConfig, with_retry};
pub use types::*;
pub use validation::{ParseOptions, extract_partial, parse_ai_response};
