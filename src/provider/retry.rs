//! Transport-failure retry around any provider gateway.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;

use super::{EventStream, ProviderGateway, TurnRequest};
use crate::error::{Result, TroupeError};
use crate::types::TurnId;
use crate::util::RetryPolicy;

/// Wraps a gateway and re-requests the whole turn on transport failure.
///
/// Each retry starts the turn from scratch: event `seq` restarts at 1,
/// which is the consumer's signal to drop partial output from the failed
/// attempt. The transport error is surfaced only once the attempt budget is
/// exhausted. Backend-reported `Error` payloads are terminal and never
/// retried here.
pub struct RetryingGateway {
    inner: Arc<dyn ProviderGateway>,
    policy: RetryPolicy,
}

impl RetryingGateway {
    pub fn new(inner: Arc<dyn ProviderGateway>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl ProviderGateway for RetryingGateway {
    async fn start_turn(&self, request: TurnRequest) -> Result<EventStream> {
        let inner = self.inner.clone();
        let policy = self.policy.clone();

        let stream = stream! {
            let mut attempt: u32 = 0;
            let mut backoff = policy.initial_backoff;
            'attempts: loop {
                attempt += 1;
                let mut inner_stream = match inner.start_turn(request.clone()).await {
                    Ok(s) => s,
                    Err(err) => {
                        if err.is_retryable() && attempt < policy.max_attempts {
                            tracing::warn!(
                                turn_id = %request.turn_id,
                                attempt,
                                error = %err,
                                "turn start failed, retrying"
                            );
                            tokio::time::sleep(policy.jittered(backoff)).await;
                            backoff = policy.next_backoff(backoff);
                            continue 'attempts;
                        }
                        yield Err(err);
                        return;
                    }
                };

                while let Some(item) = inner_stream.next().await {
                    match item {
                        Ok(event) => {
                            let terminal = event.payload.is_terminal();
                            yield Ok(event);
                            if terminal {
                                return;
                            }
                        }
                        Err(err) => {
                            if err.is_retryable() && attempt < policy.max_attempts {
                                tracing::warn!(
                                    turn_id = %request.turn_id,
                                    attempt,
                                    error = %err,
                                    "transport failure mid-stream, re-requesting turn"
                                );
                                tokio::time::sleep(policy.jittered(backoff)).await;
                                backoff = policy.next_backoff(backoff);
                                continue 'attempts;
                            }
                            yield Err(err);
                            return;
                        }
                    }
                }

                // Stream ended without a terminal event: the transport went
                // away quietly. Same treatment as an explicit failure.
                let err = TroupeError::Transport("stream ended without terminal event".into());
                if attempt < policy.max_attempts {
                    tracing::warn!(turn_id = %request.turn_id, attempt, "truncated stream, retrying");
                    tokio::time::sleep(policy.jittered(backoff)).await;
                    backoff = policy.next_backoff(backoff);
                    continue 'attempts;
                }
                yield Err(err);
                return;
            }
        };

        Ok(Box::pin(stream))
    }

    async fn cancel(&self, turn_id: TurnId) {
        self.inner.cancel(turn_id).await;
    }
}
