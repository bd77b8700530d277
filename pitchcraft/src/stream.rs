//! Streaming variant of generation.
//!
//! Text deltas are forwarded as they arrive and buffered; the buffer is
//! validated once the provider finishes. There is no retry here: any failure
//! becomes the terminal `Error` event.

use crate::error::{AiServiceError, ErrorCode};
use crate::generator::{ProposalGenerator, check_completion, parse_options};
use crate::types::*;
use crate::validation::parse_ai_response;
use futures::stream::{self, BoxStream, StreamExt};
use uuid::Uuid;

fn error_event(err: AiServiceError) -> StreamEvent {
    StreamEvent::Error {
        code: err.code,
        message: err.message,
    }
}

impl ProposalGenerator {
    /// Stream generation of `sections`.
    ///
    /// Yields zero or more `Chunk`s followed by exactly one `Done` or
    /// `Error`. The concatenated chunk text is exactly what gets validated.
    pub fn stream(
        &self,
        context: &PromptContext,
        sections: &[ProposalSection],
        options: &GenerateOptions,
    ) -> BoxStream<'static, StreamEvent> {
        let sections = match self.prepare(sections) {
            Ok(sections) => sections,
            Err(err) => return Box::pin(stream::once(async move { error_event(err) })),
        };
        let request_options = match self.request_options() {
            Ok(options) => options,
            Err(err) => return Box::pin(stream::once(async move { error_event(err) })),
        };

        let model = self.model_for(options);
        let request_id = Uuid::new_v4();
        let request = self.completion_request(context, &sections, model);
        let parse_options = parse_options(&sections, options);
        let mut upstream = self.provider.stream(&request, &request_options);

        let s = async_stream::stream! {
            tracing::debug!(%request_id, model = %request.model, "opening completion stream");
            let mut buffer = String::new();

            while let Some(event) = upstream.next().await {
                match event {
                    Ok(CompletionEvent::TextDelta(text)) => {
                        buffer.push_str(&text);
                        yield StreamEvent::Chunk { text };
                    }
                    Ok(CompletionEvent::Done(completion)) => {
                        let parsed = check_completion(&completion, &buffer)
                            .and_then(|()| parse_ai_response(&buffer, &parse_options));
                        match parsed {
                            Ok(document) => {
                                let result = GenerationResult::from_content(
                                    document,
                                    &sections,
                                    completion.usage,
                                );
                                tracing::info!(
                                    %request_id,
                                    generated = result.generated_sections.len(),
                                    failed = result.failed_sections.len(),
                                    "stream finished"
                                );
                                yield StreamEvent::Done {
                                    content: result.content,
                                    generated_sections: result.generated_sections,
                                    failed_sections: result.failed_sections,
                                    usage: result.usage,
                                };
                            }
                            Err(err) => {
                                tracing::warn!(
                                    %request_id,
                                    code = %err.code,
                                    "streamed output rejected: {}",
                                    err.message
                                );
                                yield error_event(err);
                            }
                        }
                        return;
                    }
                    Err(err) => {
                        let err = AiServiceError::from(err);
                        tracing::warn!(
                            %request_id,
                            code = %err.code,
                            "stream failed: {}",
                            err.message
                        );
                        yield error_event(err);
                        return;
                    }
                }
            }

            yield error_event(AiServiceError::new(
                ErrorCode::NetworkError,
                "Provider stream ended before the response completed",
            ));
        };
        Box::pin(s)
    }
}
