//! Shared policy plumbing

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;

use parley_llm::{CompletionProvider, CompletionRequest, LlmError};

/// Errors that can occur while a policy produces its next turn
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Completion failed: {0}")]
    Completion(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Optional per-fragment callback for live relay of a streamed turn
pub type FragmentHook<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Drive a streamed completion to its end, invoking the hook per fragment,
/// and return the concatenated text.
pub(crate) async fn collect_completion(
    provider: &Arc<dyn CompletionProvider>,
    request: CompletionRequest,
    on_fragment: Option<FragmentHook<'_>>,
) -> Result<String> {
    let mut stream = provider.complete_stream(request).await?;
    let mut content = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if !chunk.delta.is_empty() {
            if let Some(hook) = on_fragment {
                hook(&chunk.delta);
            }
            content.push_str(&chunk.delta);
        }
        if chunk.is_final {
            break;
        }
    }

    Ok(content)
}
