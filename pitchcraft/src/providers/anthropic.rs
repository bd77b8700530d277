use super::sanitize;
use super::{Provider, ProviderError};
use crate::error::parse_retry_after_ms;
use crate::types::*;
use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API (`POST {base_url}/messages`).
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url)
    }

    fn post(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
        stream: bool,
    ) -> Result<RequestBuilder, ProviderError> {
        let api_key = options
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::AuthRequired("API key required for Anthropic".into()))?;

        let mut req = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&MessagesRequest::from_completion(request, stream));
        if let Some(ms) = options.timeout_ms {
            req = req.timeout(Duration::from_millis(ms));
        }
        Ok(req)
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BASE_URL)
    }
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    stream: bool,
}

impl MessagesRequest {
    fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<AnthropicContentResp>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageData>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContentResp {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct UsageData {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct StreamEventData {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<DeltaData>,
    #[serde(default)]
    message: Option<MessageData>,
    #[serde(default)]
    usage: Option<UsageData>,
    #[serde(default)]
    error: Option<ErrorData>,
}

#[derive(Deserialize)]
struct DeltaData {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct MessageData {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Deserialize)]
struct ErrorData {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        None | Some("end_turn") | Some("stop_sequence") => StopReason::Stop,
        Some("max_tokens") => StopReason::Length,
        Some("refusal") => StopReason::Refusal,
        Some(_) => StopReason::Other,
    }
}

/// Turn a non-2xx response into a sanitized provider error.
async fn error_from_response(resp: Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after_ms = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after_ms(&format!("retry-after: {v}")));
    let body = resp.text().await.unwrap_or_default();
    http_error(status, &body, retry_after_ms)
}

/// Secrets are scrubbed here; the body stays whole so classification sees all
/// of it. Truncation happens when the error is recorded.
fn http_error(status: u16, body: &str, retry_after_ms: Option<u64>) -> ProviderError {
    if status == 429 {
        return ProviderError::RateLimited {
            retry_after_ms: retry_after_ms.or_else(|| parse_retry_after_ms(body)),
        };
    }
    ProviderError::Http {
        status,
        body: sanitize::scrub_secret_patterns(body),
    }
}

fn completion_from_response(resp: MessagesResponse, requested_model: &str) -> Completion {
    let texts: Vec<String> = resp
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect();
    let usage = resp.usage.unwrap_or_default();
    Completion {
        text: (!texts.is_empty()).then(|| texts.concat()),
        model: resp.model.unwrap_or_else(|| requested_model.to_string()),
        usage: Some(Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }),
        stop_reason: map_stop_reason(resp.stop_reason.as_deref()),
    }
}

/// Accumulates one streamed message.
#[derive(Default)]
struct StreamAccumulator {
    text: String,
    saw_text: bool,
    model: Option<String>,
    usage: Usage,
    stop_reason: StopReason,
}

impl StreamAccumulator {
    /// Apply one SSE `data` payload; returns a text delta to forward, if any.
    fn apply(&mut self, data: &str) -> Result<Option<String>, ProviderError> {
        let evt: StreamEventData = match serde_json::from_str(data) {
            Ok(evt) => evt,
            Err(_) => return Ok(None),
        };
        match evt.event_type.as_str() {
            "message_start" => {
                if let Some(m) = evt.message {
                    self.model = m.model;
                    if let Some(u) = m.usage {
                        self.usage.input_tokens = u.input_tokens;
                    }
                }
            }
            "content_block_delta" => {
                if let Some(text) = evt.delta.and_then(|d| d.text)
                    && !text.is_empty()
                {
                    self.saw_text = true;
                    self.text.push_str(&text);
                    return Ok(Some(text));
                }
            }
            "message_delta" => {
                if let Some(reason) = evt.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = map_stop_reason(Some(reason.as_str()));
                }
                if let Some(u) = evt.usage {
                    self.usage.output_tokens = u.output_tokens;
                }
            }
            "error" => {
                let err = evt.error.unwrap_or(ErrorData {
                    error_type: "api_error".into(),
                    message: "stream error".into(),
                });
                return Err(ProviderError::Stream {
                    kind: err.error_type,
                    message: sanitize::scrub_secret_patterns(&err.message),
                });
            }
            _ => {}
        }
        Ok(None)
    }

    fn finish(self, requested_model: &str) -> Completion {
        Completion {
            text: self.saw_text.then_some(self.text),
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            usage: Some(self.usage),
            stop_reason: self.stop_reason,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> Result<Completion, ProviderError> {
        let req = self.post(request, options, false)?;
        tracing::debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "sending completion request"
        );

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let body: MessagesResponse = resp.json().await?;
        Ok(completion_from_response(body, &request.model))
    }

    fn stream(
        &self,
        request: &CompletionRequest,
        options: &RequestOptions,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>> {
        let req = match self.post(request, options, true) {
            Ok(req) => req,
            Err(e) => return Box::pin(stream::once(async move { Err(e) })),
        };
        let model = request.model.clone();

        let s = async_stream::stream! {
            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => { yield Err(ProviderError::Network(e)); return; }
            };
            if !resp.status().is_success() {
                yield Err(error_from_response(resp).await);
                return;
            }

            let mut relayed = Box::pin(relay(resp.bytes_stream().eventsource(), model));
            while let Some(item) = relayed.next().await {
                yield item;
            }
        };
        Box::pin(s)
    }
}

/// Turn decoded SSE events into completion events. `Done` is only produced
/// once `message_stop` arrives; a body that ends before it is an error.
fn relay<S, E>(
    events: S,
    model: String,
) -> impl Stream<Item = Result<CompletionEvent, ProviderError>> + Send + 'static
where
    S: Stream<Item = Result<eventsource_stream::Event, EventStreamError<E>>> + Send + 'static,
    E: Into<ProviderError> + std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut events = Box::pin(events);
        let mut acc = StreamAccumulator::default();
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(EventStreamError::Transport(e)) => { yield Err(e.into()); return; }
                Err(e) => {
                    yield Err(ProviderError::Other(format!("malformed event stream: {e}")));
                    return;
                }
            };
            match acc.apply(&event.data) {
                Ok(Some(text)) => yield Ok(CompletionEvent::TextDelta(text)),
                Ok(None) => {}
                Err(e) => { yield Err(e); return; }
            }
            if event.event == "message_stop" {
                yield Ok(CompletionEvent::Done(acc.finish(&model)));
                return;
            }
        }

        yield Err(ProviderError::Truncated(
            "event stream closed before message_stop".into(),
        ));
    }
}
