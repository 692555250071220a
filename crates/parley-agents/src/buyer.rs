//! Buyer policy - evaluates the offering under a hard budget
//!
//! The buyer sees only the seller's turns, never the confidential material.
//! Its replies are scanned for the decision sentinel; a reply without one
//! keeps the negotiation going.

use std::sync::Arc;

use parley_llm::{CompletionProvider, CompletionRequest, Message};
use parley_types::Outcome;
use tracing::debug;

use crate::decision::parse_decision;
use crate::policy::{collect_completion, FragmentHook, Result};
use crate::prompts::buyer_system_prompt;

/// One buyer turn: the text plus the decision it carried, if any
#[derive(Debug, Clone)]
pub struct BuyerReply {
    pub content: String,
    pub decision: Option<Outcome>,
}

/// The buyer's negotiation policy
pub struct BuyerPolicy {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    system_prompt: String,
    max_payment: f64,
    history: Vec<Message>,
}

impl BuyerPolicy {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        requirement: &str,
        max_payment: f64,
        custom_prompt: Option<&str>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: buyer_system_prompt(requirement, max_payment, custom_prompt),
            max_payment,
            history: Vec::new(),
        }
    }

    /// Produce the buyer's next turn in response to a seller message.
    pub async fn respond(
        &mut self,
        seller_message: &str,
        on_fragment: Option<FragmentHook<'_>>,
    ) -> Result<BuyerReply> {
        self.history
            .push(Message::user(format!("[SELLER]: {seller_message}")));

        let request = CompletionRequest::new(self.history.clone())
            .with_system(self.system_prompt.clone())
            .with_model(self.model.clone());

        let content = collect_completion(&self.provider, request, on_fragment).await?;

        self.history.push(Message::assistant(content.clone()));

        let decision = parse_decision(&content, self.max_payment);
        if let Some(ref outcome) = decision {
            debug!(decision = %outcome.decision, "buyer emitted a decision sentinel");
        }
        Ok(BuyerReply { content, decision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_llm::DeterministicProvider;
    use parley_types::Decision;

    #[tokio::test]
    async fn test_buyer_passes_through_undecided_reply() {
        let provider = Arc::new(DeterministicProvider::with_script([
            "Tell me more about the source.",
        ]));
        let mut buyer = BuyerPolicy::new(provider, "test-model", "weather data", 100.0, None);

        let reply = buyer.respond("I have valuable data.", None).await.unwrap();
        assert_eq!(reply.content, "Tell me more about the source.");
        assert!(reply.decision.is_none());
    }

    #[tokio::test]
    async fn test_buyer_detects_decision_and_enforces_budget() {
        let provider = Arc::new(DeterministicProvider::with_script([
            "DECISION: ACCEPT $600 - worth every cent",
        ]));
        let mut buyer = BuyerPolicy::new(provider, "test-model", "weather data", 500.0, None);

        let reply = buyer.respond("Final offer: $600.", None).await.unwrap();
        let decision = reply.decision.unwrap();
        assert_eq!(decision.decision, Decision::Reject);
        assert!(decision.reasoning.contains("budget"));
    }

    #[tokio::test]
    async fn test_buyer_keeps_conversation_history() {
        let provider = Arc::new(DeterministicProvider::with_script(["first", "second"]));
        let mut buyer = BuyerPolicy::new(provider, "test-model", "data", 100.0, None);

        buyer.respond("hello", None).await.unwrap();
        buyer.respond("again", None).await.unwrap();

        // seller msg + reply, twice
        assert_eq!(buyer.history.len(), 4);
    }

    #[tokio::test]
    async fn test_fragment_hook_sees_the_full_reply() {
        use std::sync::Mutex;

        let provider = Arc::new(DeterministicProvider::with_script(["streamed text"]));
        let mut buyer = BuyerPolicy::new(provider, "test-model", "data", 100.0, None);

        let seen = Mutex::new(String::new());
        let hook: &(dyn Fn(&str) + Send + Sync) = &|fragment: &str| {
            seen.lock().unwrap().push_str(fragment);
        };
        let reply = buyer.respond("hi", Some(hook)).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), reply.content);
    }
}
