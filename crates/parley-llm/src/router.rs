//! Completion router - selects and manages providers

use std::sync::Arc;

use futures::stream::BoxStream;

use crate::providers::*;
use crate::types::*;

/// The completion router selects a provider based on configuration
pub struct CompletionRouter {
    provider: Arc<dyn CompletionProvider>,
    kind: ProviderKind,
}

impl CompletionRouter {
    /// Create a router with a specific provider
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        let kind = provider.kind();
        Self { provider, kind }
    }

    /// Create a router from environment variables
    ///
    /// Reads `PARLEY_LLM_PROVIDER` to select the provider:
    /// - `openai_compat` (default): any OpenAI-compatible endpoint
    /// - `ollama`: local Ollama instance
    /// - `deterministic`: no LLM, canned fallback
    pub fn from_env() -> Self {
        // Try to load .env file (ignore errors)
        let _ = dotenvy::dotenv();

        let provider_name =
            std::env::var("PARLEY_LLM_PROVIDER").unwrap_or_else(|_| "openai_compat".to_string());

        let kind = ProviderKind::parse(&provider_name).unwrap_or(ProviderKind::OpenAICompat);

        Self::from_kind(kind)
    }

    /// Create a router for a specific provider kind
    pub fn from_kind(kind: ProviderKind) -> Self {
        let provider: Arc<dyn CompletionProvider> = match kind {
            ProviderKind::OpenAICompat => Arc::new(OpenAICompatProvider::from_env()),
            ProviderKind::Ollama => Arc::new(OllamaProvider::from_env()),
            ProviderKind::Deterministic => Arc::new(DeterministicProvider::new()),
        };

        Self { provider, kind }
    }

    /// Get the current provider
    pub fn provider(&self) -> Arc<dyn CompletionProvider> {
        self.provider.clone()
    }

    /// Get the provider kind
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Check if the provider is available
    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Complete a request using the current provider
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.provider.complete(request).await
    }

    /// Stream a completion using the current provider
    pub async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        self.provider.complete_stream(request).await
    }
}

impl Default for CompletionRouter {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_router() {
        let router = CompletionRouter::from_kind(ProviderKind::Deterministic);
        assert!(router.is_available().await);
        assert_eq!(router.kind(), ProviderKind::Deterministic);

        let request = CompletionRequest::new(vec![Message::user("Hello")]);
        let response = router.complete(request).await.unwrap();

        assert!(response.content.contains("deterministic"));
    }

    #[tokio::test]
    async fn test_router_wraps_explicit_provider() {
        let provider = Arc::new(DeterministicProvider::with_script(["scripted"]));
        let router = CompletionRouter::new(provider);

        let response = router
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.content, "scripted");
    }
}
