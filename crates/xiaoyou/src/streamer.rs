//! Drives one logical send: opens the stream, feeds payloads to the
//! accumulator and restarts after transient failures while nothing has been
//! delivered yet.
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::conversation::{Accepted, ChunkAccumulator};
use crate::decoder::read_payloads;
use crate::errors::{StreamError, StreamResult};
use crate::request::{StreamRequest, StreamRequestBuilder};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::Transport;

/// How a logical send ended
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    Completed { attempts: u32 },
    /// Failed after content was delivered; the buffer was left as is
    Interrupted { error: StreamError },
    /// Failed before any content; a notice was appended to the buffer
    Reported { error: StreamError },
    Cancelled,
    /// Answered without contacting the service
    AnsweredLocally,
}

enum AttemptEnd {
    Finished,
    Revoked,
}

pub struct StreamRunner {
    transport: Arc<dyn Transport>,
    config: Arc<ChatConfig>,
    policy: RetryPolicy,
}

impl StreamRunner {
    pub fn new(transport: Arc<dyn Transport>, config: Arc<ChatConfig>) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            transport,
            config,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stream the answer to `text` into the accumulator's message, then
    /// release its lease whatever the outcome.
    pub async fn run(
        &self,
        text: &str,
        accumulator: &ChunkAccumulator,
        cancel: watch::Receiver<bool>,
    ) -> StreamOutcome {
        let outcome = self.drive(text, accumulator, cancel).await;
        debug!(message_id = %accumulator.lease().message_id(), ?outcome, "Stream ended");
        accumulator.finish();
        outcome
    }

    async fn drive(
        &self,
        text: &str,
        accumulator: &ChunkAccumulator,
        mut cancel: watch::Receiver<bool>,
    ) -> StreamOutcome {
        let request = match StreamRequestBuilder::new(&self.config).build(text) {
            Ok(request) => request,
            Err(error) => return report(accumulator, error),
        };

        let mut attempt = 0;
        let mut delivered = false;
        loop {
            if *cancel.borrow() || !accumulator.is_current() {
                return StreamOutcome::Cancelled;
            }

            info!(url = %request.url, attempt, "Requesting answer stream");
            let result = tokio::select! {
                result = self.attempt(&request, accumulator, &mut delivered) => result,
                _ = cancelled(&mut cancel) => return StreamOutcome::Cancelled,
            };

            let error = match result {
                Ok(AttemptEnd::Finished) => {
                    return StreamOutcome::Completed {
                        attempts: attempt + 1,
                    }
                }
                Ok(AttemptEnd::Revoked) => return StreamOutcome::Cancelled,
                Err(error) => error,
            };

            match self.policy.decide(&error, attempt, delivered) {
                RetryDecision::Retry { delay } => {
                    info!(
                        attempt,
                        kind = ?error.network_kind(),
                        "Retrying in {:?} after: {}",
                        delay,
                        error
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancelled(&mut cancel) => return StreamOutcome::Cancelled,
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp if delivered => {
                    warn!(
                        attempt,
                        kind = ?error.network_kind(),
                        "Stream broke after partial delivery: {}",
                        error
                    );
                    return StreamOutcome::Interrupted { error };
                }
                RetryDecision::GiveUp => return report(accumulator, error),
            }
        }
    }

    async fn attempt(
        &self,
        request: &StreamRequest,
        accumulator: &ChunkAccumulator,
        delivered: &mut bool,
    ) -> StreamResult<AttemptEnd> {
        let response = self.transport.open(request).await?;
        if !response.is_success() {
            warn!(
                url = %request.url,
                status = response.status,
                content_type = ?response.content_type,
                www_authenticate = ?response.www_authenticate,
                "Answer service returned a non-success status"
            );
            return Err(StreamError::HttpStatus(response.status));
        }
        debug!(content_type = ?response.content_type, "Answer stream opened");

        let payloads = read_payloads(response.body, request.timeout);
        futures::pin_mut!(payloads);
        while let Some(payload) = payloads.next().await {
            match accumulator.accept(&payload?) {
                Accepted::Delivered => *delivered = true,
                Accepted::Empty => {}
                Accepted::Revoked => return Ok(AttemptEnd::Revoked),
            }
        }
        Ok(AttemptEnd::Finished)
    }
}

fn report(accumulator: &ChunkAccumulator, error: StreamError) -> StreamOutcome {
    error!(kind = ?error.network_kind(), "Answer request failed: {}", error);
    if !accumulator.append_notice(&error.user_message()) {
        return StreamOutcome::Cancelled;
    }
    StreamOutcome::Reported { error }
}

/// Resolves once `true` is observed. A dropped sender never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
