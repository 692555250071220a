//! The negotiation turn loop
//!
//! One call to [`NegotiationEngine::run`] drives one instance from
//! `running` to a terminal status and yields the progress events along the
//! way. Turns are strictly serialized: the buyer and seller never run
//! concurrently within one instance, and every turn is persisted before the
//! loop moves on. The terminal store transition is applied before the
//! terminal event is yielded, so an observer holding that event can trust
//! the stored row.
//!
//! Failures never escape the stream: agent errors, timeouts, store errors
//! and cancellation all collapse into the `failed` transition (which also
//! redacts the confidential seller fields) plus a terminal error event.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_agents::{BuyerPolicy, SellerPolicy};
use parley_db::{Database, InstanceRepo};
use parley_llm::CompletionProvider;
use parley_types::{Instance, InstanceStatus, Outcome, Phase, ProgressEvent, TurnRole};

use crate::config::EngineConfig;

/// Reason recorded when the turn budget runs out without a decision
pub const EXHAUSTED_REASON: &str = "Maximum negotiation turns reached without agreement";

/// Reason recorded when a run is cooperatively cancelled
pub const ABORTED_REASON: &str = "aborted";

/// Reason recorded when the seller fields are missing at run start
pub const MISSING_SELLER_DATA_REASON: &str = "missing seller data";

pub struct NegotiationEngine {
    db: Database,
    provider: Arc<dyn CompletionProvider>,
    config: EngineConfig,
}

impl NegotiationEngine {
    pub fn new(db: Database, provider: Arc<dyn CompletionProvider>, config: EngineConfig) -> Self {
        Self {
            db,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one negotiation to completion or failure.
    ///
    /// The instance must already be in `running` status (the `start`
    /// transition is the caller's job). The returned stream yields any
    /// number of progress events and exactly one terminal event.
    pub fn run(
        &self,
        instance: Instance,
        cancel: CancellationToken,
    ) -> BoxStream<'static, ProgressEvent> {
        let db = self.db.clone();
        let provider = self.provider.clone();
        let config = self.config.clone();

        let stream = async_stream::stream! {
            let instances = db.instance_repo();
            let transcripts = db.transcript_repo();
            let id = instance.id.clone();

            if instance.status != InstanceStatus::Running {
                warn!(instance = %id, status = %instance.status, "run invoked on non-running instance");
                yield ProgressEvent::error("instance is not running");
                return;
            }

            let (Some(seller_info), Some(seller_proof)) =
                (instance.seller_info.clone(), instance.seller_proof.clone())
            else {
                yield fail_run(&instances, &id, MISSING_SELLER_DATA_REASON).await;
                return;
            };

            info!(instance = %id, model = %instance.model, max_turns = instance.max_turns, "negotiation started");

            let mut buyer = BuyerPolicy::new(
                provider.clone(),
                instance.model.clone(),
                &instance.buyer_requirement,
                instance.max_payment,
                instance.buyer_prompt.as_deref(),
            );
            let mut seller = SellerPolicy::new(
                provider.clone(),
                instance.model.clone(),
                &seller_info,
                &seller_proof,
                instance.seller_prompt.as_deref(),
            );

            // Turn 1: the seller opens
            let mut turn: u32 = 1;
            yield ProgressEvent::progress(turn, Phase::SellerPresenting);

            let invoked = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = tokio::time::timeout(config.turn_timeout, seller.opening_statement(None)) => Some(result),
            };
            let opening = match invoked {
                None => {
                    yield fail_run(&instances, &id, ABORTED_REASON).await;
                    return;
                }
                Some(Err(_)) => {
                    yield fail_run(&instances, &id, &timeout_reason(&config)).await;
                    return;
                }
                Some(Ok(Err(e))) => {
                    yield fail_run(&instances, &id, &e.to_string()).await;
                    return;
                }
                Some(Ok(Ok(content))) => content,
            };

            if let Err(e) = transcripts.append(&id, turn, TurnRole::Seller, &opening).await {
                yield fail_run(&instances, &id, &format!("transcript write failed: {e}")).await;
                return;
            }

            let mut last_seller_message = opening;

            while turn < instance.max_turns {
                if cancel.is_cancelled() {
                    yield fail_run(&instances, &id, ABORTED_REASON).await;
                    return;
                }

                // Buyer evaluates the latest seller message
                turn += 1;
                yield ProgressEvent::progress(turn, Phase::BuyerEvaluating);

                let invoked = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = tokio::time::timeout(config.turn_timeout, buyer.respond(&last_seller_message, None)) => Some(result),
                };
                let reply = match invoked {
                    None => {
                        yield fail_run(&instances, &id, ABORTED_REASON).await;
                        return;
                    }
                    Some(Err(_)) => {
                        yield fail_run(&instances, &id, &timeout_reason(&config)).await;
                        return;
                    }
                    Some(Ok(Err(e))) => {
                        yield fail_run(&instances, &id, &e.to_string()).await;
                        return;
                    }
                    Some(Ok(Ok(reply))) => reply,
                };

                if let Err(e) = transcripts.append(&id, turn, TurnRole::Buyer, &reply.content).await {
                    yield fail_run(&instances, &id, &format!("transcript write failed: {e}")).await;
                    return;
                }

                if let Some(outcome) = reply.decision {
                    yield finalize(&instances, &id, &outcome).await;
                    return;
                }

                // No seller reply once the budget is spent
                if turn >= instance.max_turns {
                    break;
                }

                if cancel.is_cancelled() {
                    yield fail_run(&instances, &id, ABORTED_REASON).await;
                    return;
                }

                // Seller answers
                turn += 1;
                yield ProgressEvent::progress(turn, Phase::SellerResponding);

                let buyer_message = reply.content;
                let invoked = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = tokio::time::timeout(config.turn_timeout, seller.respond(&buyer_message, None)) => Some(result),
                };
                let answer = match invoked {
                    None => {
                        yield fail_run(&instances, &id, ABORTED_REASON).await;
                        return;
                    }
                    Some(Err(_)) => {
                        yield fail_run(&instances, &id, &timeout_reason(&config)).await;
                        return;
                    }
                    Some(Ok(Err(e))) => {
                        yield fail_run(&instances, &id, &e.to_string()).await;
                        return;
                    }
                    Some(Ok(Ok(content))) => content,
                };

                if let Err(e) = transcripts.append(&id, turn, TurnRole::Seller, &answer).await {
                    yield fail_run(&instances, &id, &format!("transcript write failed: {e}")).await;
                    return;
                }

                last_seller_message = answer;
            }

            // Turn budget spent without a decision
            yield finalize(&instances, &id, &Outcome::reject(EXHAUSTED_REASON)).await;
        };

        Box::pin(stream)
    }
}

fn timeout_reason(config: &EngineConfig) -> String {
    format!(
        "agent invocation timed out after {}s",
        config.turn_timeout.as_secs()
    )
}

/// Apply the `complete` transition and build the matching terminal event.
async fn finalize(instances: &InstanceRepo, id: &str, outcome: &Outcome) -> ProgressEvent {
    match instances.complete(id, outcome).await {
        Ok(Some(_)) => {
            info!(instance = %id, decision = %outcome.decision, "negotiation completed");
            ProgressEvent::complete(outcome)
        }
        Ok(None) => {
            warn!(instance = %id, "complete transition lost: instance no longer running");
            ProgressEvent::error("instance no longer running")
        }
        Err(e) => {
            warn!(instance = %id, error = %e, "complete transition failed");
            ProgressEvent::error(format!("failed to record outcome: {e}"))
        }
    }
}

/// Apply the `fail` transition (which also redacts the confidential seller
/// fields) and build the terminal error event.
async fn fail_run(instances: &InstanceRepo, id: &str, reason: &str) -> ProgressEvent {
    match instances.fail(id, reason).await {
        Ok(Some(_)) => {
            warn!(instance = %id, reason, "negotiation failed");
        }
        Ok(None) => {
            warn!(instance = %id, reason, "fail transition lost: instance no longer running");
        }
        Err(e) => {
            warn!(instance = %id, reason, error = %e, "fail transition errored");
        }
    }
    ProgressEvent::error(reason)
}
