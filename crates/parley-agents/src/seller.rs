//! Seller policy - presents the offering without revealing it
//!
//! The confidential material lives only in the seller's system context.
//! The opening statement introduces the offering; subsequent turns answer
//! the buyer.

use std::sync::Arc;

use parley_llm::{CompletionProvider, CompletionRequest, Message};

use crate::policy::{collect_completion, FragmentHook, Result};
use crate::prompts::{seller_system_prompt, SELLER_OPENING_INSTRUCTION};

/// The seller's negotiation policy
pub struct SellerPolicy {
    provider: Arc<dyn CompletionProvider>,
    model: String,
    system_prompt: String,
    history: Vec<Message>,
}

impl SellerPolicy {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        model: impl Into<String>,
        seller_info: &str,
        seller_proof: &str,
        custom_prompt: Option<&str>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: seller_system_prompt(seller_info, seller_proof, custom_prompt),
            history: Vec::new(),
        }
    }

    /// Produce the opening statement that starts the negotiation.
    pub async fn opening_statement(
        &mut self,
        on_fragment: Option<FragmentHook<'_>>,
    ) -> Result<String> {
        let request = CompletionRequest::new(vec![Message::user(SELLER_OPENING_INSTRUCTION)])
            .with_system(self.system_prompt.clone())
            .with_model(self.model.clone());

        let content = collect_completion(&self.provider, request, on_fragment).await?;

        self.history.push(Message::assistant(content.clone()));
        Ok(content)
    }

    /// Produce the seller's next turn in response to a buyer message.
    pub async fn respond(
        &mut self,
        buyer_message: &str,
        on_fragment: Option<FragmentHook<'_>>,
    ) -> Result<String> {
        self.history
            .push(Message::user(format!("[BUYER]: {buyer_message}")));

        let request = CompletionRequest::new(self.history.clone())
            .with_system(self.system_prompt.clone())
            .with_model(self.model.clone());

        let content = collect_completion(&self.provider, request, on_fragment).await?;

        self.history.push(Message::assistant(content.clone()));
        Ok(content)
    }
}
