// wallet-session/src/api.rs
//! Thin client for the backend REST API.
//!
//! Authenticated calls read the bearer token from the [`SessionStore`] on every
//! request, so they always use whatever the session last committed.

use common::{
    HealthResponse, NonceResponse, TokenResponse, VerifyRequest, VerifyTokenResponse, ErrorBody,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::ApiError;
use crate::storage::SessionStore;

pub const HEALTH_PATH: &str = "/system/health";
pub const NONCE_PATH: &str = "/api/auth/nonce";
pub const VERIFY_PATH: &str = "/api/auth/verify";
pub const VERIFY_TOKEN_PATH: &str = "/api/auth/verify-token";

/// Rules, receipts and savings goals are passed through as the backend sends them
pub type Payload = Value;

#[derive(Debug, Clone, Deserialize)]
pub struct ParsedInstruction {
    pub rule: Payload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    pub balance: Payload,
}

#[derive(Debug, Serialize)]
struct ParseRequest<'a> {
    instruction: &'a str,
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: Url,
    client: Client,
    store: Arc<dyn SessionStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Self::with_client(base_url, client, store)
    }

    pub fn with_client(base_url: &str, client: Client, store: Arc<dyn SessionStore>) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self { base_url, client, store })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `path` appended to the base URL's own path, then each of `params` as an
    /// escaped segment
    fn url(&self, path: &str, params: &[&str]) -> Result<Url, ApiError> {
        let mut full = self.base_url.clone();
        {
            let mut segments = full
                .path_segments_mut()
                .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
            segments.extend(params);
        }
        Ok(full)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url)
    }

    fn authed(&self, method: Method, url: Url) -> Result<RequestBuilder, ApiError> {
        match self.store.token()? {
            Some(token) => Ok(self.request(method, url).bearer_auth(token)),
            None => {
                tracing::warn!("No auth token found in session store");
                Err(ApiError::MissingToken)
            }
        }
    }

    async fn send<T: DeserializeOwned>(builder: RequestBuilder, fallback: &str) -> Result<T, ApiError> {
        let response = builder.send().await?;
        Self::handle_response(response, fallback).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let message = body.text().unwrap_or(fallback).to_string();
            tracing::debug!("Backend returned {}: {}", status, message);
            return Err(ApiError::Status { status: status.as_u16(), message });
        }
        Ok(response.json::<T>().await?)
    }

    /// Single reachability check; the caller bounds it with its own timeout
    pub async fn health(&self) -> Result<HealthResponse, ApiError> {
        let builder = self.request(Method::GET, self.url(HEALTH_PATH, &[])?);
        Self::send(builder, "Backend health check failed").await
    }

    pub async fn nonce(&self, address: &str) -> Result<NonceResponse, ApiError> {
        if address.is_empty() {
            return Err(ApiError::MissingArgument("Address"));
        }
        let builder = self
            .request(Method::GET, self.url(NONCE_PATH, &[])?)
            .query(&[("wallet", address)]);
        Self::send(builder, "Failed to get nonce").await
    }

    pub async fn verify(&self, request: &VerifyRequest) -> Result<TokenResponse, ApiError> {
        if request.wallet.is_empty() || request.signature.is_empty() {
            return Err(ApiError::MissingArgument("Address and signature"));
        }
        let builder = self.request(Method::POST, self.url(VERIFY_PATH, &[])?).json(request);
        Self::send(builder, "Signature verification failed").await
    }

    /// Ask the backend whether `token` is still good for `address`.
    ///
    /// Takes the token explicitly because restore runs before anything is
    /// trusted from the store.
    pub async fn verify_token(&self, token: &str, address: &str) -> Result<VerifyTokenResponse, ApiError> {
        if token.is_empty() {
            return Err(ApiError::MissingToken);
        }
        let builder = self
            .request(Method::GET, self.url(VERIFY_TOKEN_PATH, &[])?)
            .query(&[("wallet", address)])
            .bearer_auth(token);
        Self::send(builder, "Token verification failed").await
    }

    pub async fn rules(&self) -> Result<Payload, ApiError> {
        Self::send(self.authed(Method::GET, self.url("/api/rules", &[])?)?, "Failed to fetch rules").await
    }

    pub async fn create_rule(&self, rule: &Payload) -> Result<Payload, ApiError> {
        if rule.is_null() {
            return Err(ApiError::MissingArgument("Rule data"));
        }
        let builder = self.authed(Method::POST, self.url("/api/rules/create", &[])?)?.json(rule);
        Self::send(builder, "Failed to create rule").await
    }

    pub async fn rule_details(&self, rule_id: &str) -> Result<Payload, ApiError> {
        let url = self.rule_url(rule_id, None)?;
        Self::send(self.authed(Method::GET, url)?, "Failed to fetch rule details").await
    }

    pub async fn rule_price(&self, rule_id: &str) -> Result<Payload, ApiError> {
        let url = self.rule_url(rule_id, Some("price"))?;
        Self::send(self.authed(Method::GET, url)?, "Failed to fetch price").await
    }

    pub async fn execute_rule(&self, rule_id: &str) -> Result<Payload, ApiError> {
        let url = self.rule_url(rule_id, Some("execute"))?;
        Self::send(self.authed(Method::POST, url)?, "Failed to execute rule").await
    }

    pub async fn activate_rule(&self, rule_id: &str) -> Result<Payload, ApiError> {
        let url = self.rule_url(rule_id, Some("activate"))?;
        Self::send(self.authed(Method::POST, url)?, "Failed to activate rule").await
    }

    /// Turn a natural-language instruction into a rule draft
    pub async fn parse_instruction(&self, instruction: &str) -> Result<ParsedInstruction, ApiError> {
        if instruction.trim().is_empty() {
            return Err(ApiError::MissingArgument("Instruction"));
        }
        let builder = self
            .authed(Method::POST, self.url("/api/ai/parse", &[])?)?
            .json(&ParseRequest { instruction });
        Self::send(builder, "Failed to parse instruction").await
    }

    pub async fn balance(&self) -> Result<BalanceResponse, ApiError> {
        Self::send(self.authed(Method::GET, self.url("/api/wallet/balance", &[])?)?, "Failed to fetch balance").await
    }

    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Payload, ApiError> {
        if tx_hash.is_empty() {
            return Err(ApiError::MissingArgument("Transaction hash"));
        }
        let url = self.url("/api/transactions", &[tx_hash])?;
        Self::send(self.authed(Method::GET, url)?, "Failed to fetch receipt").await
    }

    pub async fn savings(&self) -> Result<Payload, ApiError> {
        Self::send(self.authed(Method::GET, self.url("/api/savings", &[])?)?, "Failed to fetch savings").await
    }

    fn rule_url(&self, rule_id: &str, action: Option<&str>) -> Result<Url, ApiError> {
        if rule_id.is_empty() {
            return Err(ApiError::MissingArgument("Rule ID"));
        }
        match action {
            Some(action) => self.url("/api/rules", &[rule_id, action]),
            None => self.url("/api/rules", &[rule_id]),
        }
    }

    pub async fn create_savings_goal(&self, goal: &Payload) -> Result<Payload, ApiError> {
        if goal.is_null() {
            return Err(ApiError::MissingArgument("Goal data"));
        }
        let builder = self.authed(Method::POST, self.url("/api/savings/create", &[])?)?.json(goal);
        Self::send(builder, "Failed to create savings goal").await
    }
}
