//! Caller identity extraction
//!
//! Identity establishment (the challenge/response protocol and token
//! issuance) lives outside this service. The service only consumes its
//! result through [`AuthVerifier`]: bearer token in, verified address out.
//! Handlers declare [`CallerIdentity`] when a verified caller is required
//! and [`OptionalIdentity`] when the view merely improves for participants.

use std::collections::HashMap;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::ApiError;
use crate::state::AppState;

/// Maps a bearer token to a verified caller address. The service trusts the
/// returned identity without re-verifying it.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<String>;
}

/// Fixed token-to-address table, seeded from the environment. Suitable for
/// development and tests; production deployments plug in their session
/// verifier here.
#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, address: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), address.into());
        self
    }

    /// Parse `PARLEY_STATIC_TOKENS`, a comma-separated `token:address` list
    pub fn from_env() -> Self {
        let mut verifier = Self::new();
        if let Ok(raw) = std::env::var("PARLEY_STATIC_TOKENS") {
            for pair in raw.split(',') {
                if let Some((token, address)) = pair.trim().split_once(':') {
                    verifier.tokens.insert(token.to_string(), address.to_string());
                }
            }
        }
        verifier
    }
}

#[async_trait]
impl AuthVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<String> {
        self.tokens.get(token).cloned()
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Verified caller address; rejects the request when absent or invalid
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub String);

#[async_trait]
impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;
        let address = state
            .verifier
            .verify(token)
            .await
            .ok_or(ApiError::Unauthorized)?;
        Ok(CallerIdentity(address))
    }
}

/// Verified caller address if one was presented; never rejects
#[derive(Debug, Clone)]
pub struct OptionalIdentity(pub Option<String>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalIdentity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let address = match bearer_token(parts) {
            Some(token) => state.verifier.verify(token).await,
            None => None,
        };
        Ok(OptionalIdentity(address))
    }
}
