//! Generation orchestrator: prompt, provider call, validation and retry.

use crate::config::ClientConfig;
use crate::error::{AiServiceError, ErrorCode};
use crate::prompt::{JsonContractPrompt, PromptBuilder};
use crate::providers::Provider;
use crate::providers::anthropic::AnthropicProvider;
use crate::retry::{RetryConfig, with_retry};
use crate::types::*;
use crate::validation::{ParseOptions, parse_ai_response};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Generates proposal sections through a completion provider.
///
/// Holds only immutable configuration, so clones are cheap and can be
/// shared across tasks.
#[derive(Clone)]
pub struct ProposalGenerator {
    pub(crate) config: ClientConfig,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) prompts: Arc<dyn PromptBuilder>,
}

impl ProposalGenerator {
    pub fn new(config: ClientConfig, provider: Arc<dyn Provider>) -> Self {
        Self {
            config,
            provider,
            prompts: Arc::new(JsonContractPrompt::default()),
        }
    }

    /// Generator backed by the Anthropic Messages API at `config.base_url`.
    pub fn anthropic(config: ClientConfig) -> Self {
        let provider = Arc::new(AnthropicProvider::new(&config.base_url));
        Self::new(config, provider)
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn PromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Generate `sections` in one request.
    ///
    /// Fails only when retries are exhausted or a non-retryable error occurs.
    /// With `allow_partial`, sections that did not validate are reported in
    /// `failed_sections` instead of failing the call.
    pub async fn generate(
        &self,
        context: &PromptContext,
        sections: &[ProposalSection],
        options: &GenerateOptions,
    ) -> Result<GenerationResult, AiServiceError> {
        let model = self.model_for(options);
        let span = tracing::info_span!("generate", request_id = %Uuid::new_v4(), model = %model);
        self.generate_inner(context, sections, options, model)
            .instrument(span)
            .await
    }

    async fn generate_inner(
        &self,
        context: &PromptContext,
        sections: &[ProposalSection],
        options: &GenerateOptions,
        model: String,
    ) -> Result<GenerationResult, AiServiceError> {
        let sections = self.prepare(sections)?;
        let request = self.completion_request(context, &sections, model);
        let request_options = self.request_options()?;
        let parse_options = parse_options(&sections, options);
        let retry = RetryConfig::new(
            options.max_retries.unwrap_or(self.config.retry.max_retries),
            self.config.retry.initial_delay_ms,
        );

        let (request, request_options, parse_options) =
            (&request, &request_options, &parse_options);
        let (document, usage) =
            with_retry(&retry, || self.attempt(request, request_options, parse_options)).await?;

        let result = GenerationResult::from_content(document, &sections, usage);
        tracing::info!(
            generated = result.generated_sections.len(),
            failed = result.failed_sections.len(),
            "generation finished"
        );
        Ok(result)
    }

    /// Regenerate one section; a missing section is an error rather than a
    /// partial result.
    pub async fn generate_single_section(
        &self,
        context: &PromptContext,
        section: ProposalSection,
    ) -> Result<GenerationResult, AiServiceError> {
        self.generate(context, &[section], &GenerateOptions::strict())
            .await
    }

    /// Generate each section in its own request, at most `concurrency` at a
    /// time. Results are aggregated in request order.
    pub async fn generate_concurrent(
        &self,
        context: &PromptContext,
        sections: &[ProposalSection],
        options: &GenerateOptions,
        concurrency: usize,
    ) -> Result<GenerationResult, AiServiceError> {
        let sections = self.prepare(sections)?;
        let per_section = GenerateOptions {
            allow_partial: false,
            ..options.clone()
        };

        let outcomes: Vec<Result<GenerationResult, AiServiceError>> = stream::iter(&sections)
            .map(|section| self.generate(context, std::slice::from_ref(section), &per_section))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut content = GeneratedDocument::default();
        let mut usage = None;
        let mut first_error = None;
        for (section, outcome) in sections.iter().zip(outcomes) {
            match outcome {
                Ok(result) => {
                    content.absorb(result.content);
                    usage = sum_usage(usage, result.usage);
                }
                Err(err) => {
                    tracing::warn!(section = %section, code = %err.code, "section request failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_error
            && (content.is_empty() || !options.allow_partial)
        {
            return Err(err);
        }
        Ok(GenerationResult::from_content(content, &sections, usage))
    }

    /// Retry only the sections `previous` failed on and fold them back in.
    pub async fn regenerate_failed(
        &self,
        context: &PromptContext,
        previous: GenerationResult,
        options: &GenerateOptions,
    ) -> Result<GenerationResult, AiServiceError> {
        if previous.failed_sections.is_empty() {
            return Ok(previous);
        }
        let retried = self
            .generate(context, &previous.failed_sections, options)
            .await?;
        Ok(previous.merge(retried))
    }

    /// One provider call plus validation. Everything here is retried as a unit.
    async fn attempt(
        &self,
        request: &CompletionRequest,
        request_options: &RequestOptions,
        parse_options: &ParseOptions,
    ) -> Result<(GeneratedDocument, Option<Usage>), AiServiceError> {
        tracing::debug!(prompt_chars = request.prompt.len(), "calling provider");
        let completion = self.provider.complete(request, request_options).await?;
        let text = completion_text(&completion)?;
        tracing::debug!(response_chars = text.len(), "provider responded");
        let document = parse_ai_response(text, parse_options)?;
        Ok((document, completion.usage))
    }

    pub(crate) fn model_for(&self, options: &GenerateOptions) -> String {
        options
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.model.clone())
    }

    /// Deduplicate and reject an empty request.
    pub(crate) fn prepare(
        &self,
        sections: &[ProposalSection],
    ) -> Result<Vec<ProposalSection>, AiServiceError> {
        let sections = dedup_sections(sections);
        if sections.is_empty() {
            return Err(AiServiceError::invalid_request(
                "At least one section must be requested",
            ));
        }
        Ok(sections)
    }

    pub(crate) fn request_options(&self) -> Result<RequestOptions, AiServiceError> {
        let api_key = self
            .config
            .api_key()
            .ok_or_else(AiServiceError::api_key_missing)?;
        Ok(RequestOptions {
            api_key: Some(api_key.to_string()),
            timeout_ms: Some(self.config.timeout_ms),
        })
    }

    pub(crate) fn completion_request(
        &self,
        context: &PromptContext,
        sections: &[ProposalSection],
        model: String,
    ) -> CompletionRequest {
        let prompt = self.prompts.build(context, sections);
        CompletionRequest {
            model,
            system: prompt.system,
            prompt: prompt.user,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

pub(crate) fn parse_options(
    sections: &[ProposalSection],
    options: &GenerateOptions,
) -> ParseOptions {
    if options.allow_partial {
        ParseOptions::default()
    } else {
        ParseOptions::strict(sections)
    }
}

/// Refusals and blank payloads are errors before validation runs.
pub(crate) fn check_completion(completion: &Completion, text: &str) -> Result<(), AiServiceError> {
    if completion.stop_reason == StopReason::Refusal {
        return Err(AiServiceError::new(
            ErrorCode::ContentPolicy,
            "Model declined to produce the requested content",
        ));
    }
    if completion.stop_reason == StopReason::Length {
        tracing::warn!("model output hit the token limit and may be truncated");
    }
    if text.trim().is_empty() {
        return Err(AiServiceError::empty_response());
    }
    Ok(())
}

fn completion_text(completion: &Completion) -> Result<&str, AiServiceError> {
    let text = completion.text.as_deref().unwrap_or_default();
    check_completion(completion, text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::testing::{ScriptedProvider, http, reply};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn config() -> ClientConfig {
        ClientConfig::default().with_api_key("sk-test")
    }

    fn generator(provider: &Arc<ScriptedProvider>) -> ProposalGenerator {
        ProposalGenerator::new(config(), provider.clone())
    }

    fn context() -> PromptContext {
        PromptContext {
            business_name: "Harbor Dental".into(),
            ..Default::default()
        }
    }

    const TWO: [ProposalSection; 2] =
        [ProposalSection::ExecutiveSummary, ProposalSection::Timeline];

    fn both_sections() -> String {
        json!({
            "executiveSummary": "A faster site.",
            "timeline": [{"phase": "Discovery", "duration": "2 weeks"}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn complete_response_is_not_partial() {
        let provider = Arc::new(ScriptedProvider::replies(vec![reply(&both_sections())]));
        let result = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::strict())
            .await
            .unwrap();

        assert!(!result.is_partial);
        assert!(result.failed_sections.is_empty());
        assert_eq!(result.generated_sections, TWO.to_vec());
        assert_eq!(result.usage, Some(Usage { input_tokens: 10, output_tokens: 5 }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider::replies(vec![reply(&both_sections())]));
        let generator = ProposalGenerator::new(ClientConfig::default(), provider.clone());
        let err = generator
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiKeyMissing);
        assert!(!err.retryable);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn empty_section_list_is_rejected() {
        let provider = Arc::new(ScriptedProvider::default());
        let err = generator(&provider)
            .generate(&context(), &[], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn partial_output_lists_failed_sections() {
        let provider = Arc::new(ScriptedProvider::replies(vec![reply(
            r#"{"executiveSummary": "Hi", "closingContent": "unrequested"}"#,
        )]));
        let result = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap();

        assert!(result.is_partial);
        assert_eq!(result.generated_sections, vec![ProposalSection::ExecutiveSummary]);
        assert_eq!(result.failed_sections, vec![ProposalSection::Timeline]);
        assert!(result.content.closing_content.is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn strict_mode_retries_missing_sections() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            reply(r#"{"executiveSummary": "Hi"}"#),
            reply(&both_sections()),
        ]));
        let start = Instant::now();
        let result = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::strict())
            .await
            .unwrap();

        assert!(!result.is_partial);
        assert_eq!(provider.calls(), 2);
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_succeed() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            http(529),
            reply("   "),
            reply(&both_sections()),
        ]));
        let result = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(result.generated_sections, TWO.to_vec());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_surface_last_error() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            http(500),
            http(503),
            reply("not json at all"),
        ]));
        let err = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ResponseInvalidJson);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            http(401),
            reply(&both_sections()),
        ]));
        let err = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthenticationFailed);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn refusal_is_a_content_policy_error() {
        let provider = Arc::new(ScriptedProvider::replies(vec![Ok(Completion {
            text: Some("I can't help with that.".into()),
            stop_reason: StopReason::Refusal,
            ..Default::default()
        })]));
        let err = generator(&provider)
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ContentPolicy);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            http(500),
            reply(&both_sections()),
        ]));
        let options = GenerateOptions {
            max_retries: Some(0),
            ..Default::default()
        };
        let err = generator(&provider)
            .generate(&context(), &TWO, &options)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_retry_count_applies_by_default() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            http(500),
            http(500),
            reply(&both_sections()),
        ]));
        let mut config = config();
        config.retry.max_retries = 0;
        let err = ProposalGenerator::new(config.clone(), provider.clone())
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ServerError);
        assert_eq!(provider.calls(), 1);

        // an explicit count wins over the configured one
        let options = GenerateOptions {
            max_retries: Some(1),
            ..Default::default()
        };
        let result = ProposalGenerator::new(config, provider.clone())
            .generate(&context(), &TWO, &options)
            .await
            .unwrap();
        assert_eq!(result.generated_sections, TWO.to_vec());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn model_override_reaches_the_provider() {
        let provider = Arc::new(ScriptedProvider::replies(vec![reply(&both_sections())]));
        let options = GenerateOptions {
            model: Some("claude-haiku-4-5".into()),
            ..Default::default()
        };
        generator(&provider)
            .generate(&context(), &TWO, &options)
            .await
            .unwrap();

        let seen = provider.seen();
        assert_eq!(seen[0].model, "claude-haiku-4-5");
        assert!(seen[0].prompt.contains("\"timeline\""));
    }

    #[tokio::test]
    async fn single_section_is_strict() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            reply(r#"{"closingContent": "Thanks"}"#),
        ]));
        let result = generator(&provider)
            .generate_single_section(&context(), ProposalSection::ClosingContent)
            .await
            .unwrap();
        assert_eq!(result.content.closing_content.as_deref(), Some("Thanks"));
        assert_eq!(result.generated_sections, vec![ProposalSection::ClosingContent]);
    }

    fn route_by_section(request: &CompletionRequest) -> Result<Completion, ProviderError> {
        if request.prompt.contains("\"executiveSummary\"") {
            reply(r#"{"executiveSummary": "Summary"}"#)
        } else if request.prompt.contains("\"closingContent\"") {
            reply(r#"{"closingContent": "Thanks"}"#)
        } else {
            http(400)
        }
    }

    #[tokio::test]
    async fn concurrent_fan_out_aggregates_in_request_order() {
        let provider = Arc::new(ScriptedProvider::routed(route_by_section));
        let sections = [
            ProposalSection::ClosingContent,
            ProposalSection::Timeline,
            ProposalSection::ExecutiveSummary,
        ];
        let result = generator(&provider)
            .generate_concurrent(&context(), &sections, &GenerateOptions::default(), 2)
            .await
            .unwrap();

        assert_eq!(
            result.generated_sections,
            vec![ProposalSection::ClosingContent, ProposalSection::ExecutiveSummary]
        );
        assert_eq!(result.failed_sections, vec![ProposalSection::Timeline]);
        assert_eq!(result.usage, Some(Usage { input_tokens: 20, output_tokens: 10 }));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn concurrent_fan_out_escalates_when_strict_or_all_failed() {
        let provider = Arc::new(ScriptedProvider::routed(route_by_section));
        let sections = [ProposalSection::ExecutiveSummary, ProposalSection::Timeline];
        let err = generator(&provider)
            .generate_concurrent(&context(), &sections, &GenerateOptions::strict(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);

        let err = generator(&provider)
            .generate_concurrent(
                &context(),
                &[ProposalSection::Timeline],
                &GenerateOptions::default(),
                4,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn regenerate_failed_only_requests_failed_sections() {
        let provider = Arc::new(ScriptedProvider::replies(vec![
            reply(r#"{"executiveSummary": "Hi"}"#),
            reply(r#"{"timeline": [{"phase": "Build"}]}"#),
        ]));
        let generator = generator(&provider);
        let first = generator
            .generate(&context(), &TWO, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(first.failed_sections, vec![ProposalSection::Timeline]);

        let merged = generator
            .regenerate_failed(&context(), first, &GenerateOptions::default())
            .await
            .unwrap();
        assert!(!merged.is_partial);
        assert_eq!(merged.generated_sections, TWO.to_vec());
        assert_eq!(merged.usage, Some(Usage { input_tokens: 20, output_tokens: 10 }));

        let seen = provider.seen();
        assert!(!seen[1].prompt.contains("\"executiveSummary\""));

        // nothing left to do
        let again = generator
            .regenerate_failed(&context(), merged.clone(), &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(again, merged);
        assert_eq!(provider.calls(), 2);
    }
}
