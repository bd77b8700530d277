//! In-memory provider for unit tests.

use crate::providers::{Provider, ProviderError};
use crate::types::*;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

type Route = Box<dyn Fn(&CompletionRequest) -> Result<Completion, ProviderError> + Send + Sync>;

/// Replays queued replies in call order, or answers through a routing
/// function when one is set.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    calls: AtomicUsize,
    replies: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    streams: Mutex<VecDeque<Vec<Result<CompletionEvent, ProviderError>>>>,
    route: Option<Route>,
    seen: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub(crate) fn replies(replies: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        }
    }

    pub(crate) fn routed(
        route: impl Fn(&CompletionRequest) -> Result<Completion, ProviderError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            route: Some(Box::new(route)),
            ..Default::default()
        }
    }

    pub(crate) fn streams(streams: Vec<Vec<Result<CompletionEvent, ProviderError>>>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
            ..Default::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// A successful completion carrying `text`.
pub(crate) fn reply(text: &str) -> Result<Completion, ProviderError> {
    Ok(Completion {
        text: Some(text.to_string()),
        model: "test-model".into(),
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
        stop_reason: StopReason::Stop,
    })
}

pub(crate) fn http(status: u16) -> Result<Completion, ProviderError> {
    Err(ProviderError::Http {
        status,
        body: format!("status {status}"),
    })
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
        _options: &RequestOptions,
    ) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if let Some(route) = &self.route {
            return route(request);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".into())))
    }

    fn stream(
        &self,
        request: &CompletionRequest,
        _options: &RequestOptions,
    ) -> BoxStream<'static, Result<CompletionEvent, ProviderError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        let events = self.streams.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(stream::iter(events))
    }
}
