//! HTTP client for the token, account and reward endpoints.
//!
//! One client per identity so each identity's traffic leaves through its own
//! proxy. Calls here make a single attempt; retry policy lives with the callers.

use std::sync::Arc;

use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::types::{
    AccountData, ClaimDetailsData, Envelope, EpochReward, EpochRewardData, RealtimeEntry,
    TokenData, id_label, lenient_f64, lenient_u64,
};
use crate::config::Endpoints;
use crate::error::{ApiError, ConfigError};
use crate::proxy::ProxyEndpoint;

/// Endpoint paths relative to the API and rewards bases.
pub mod paths {
    pub const GENERATE_TOKEN: &str = "/api/v1/auth/generate_token";
    pub const USERS_ME: &str = "/api/v1/users/me";
    pub const REWARD_REALTIME: &str = "/api/v1/reward_realtime";
    pub const REWARD_HISTORY: &str = "/api/v1/reward_history";
    pub const REWARD: &str = "/api/v1/reward";
    pub const CLAIM_DETAILS: &str = "/api/v1/claim_details";
    pub const CLAIM_REWARD: &str = "/api/v1/claim_reward";
    pub const CLAIM_TIER: &str = "/api/v1/claim_tier";
}

/// Per-identity API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
}

impl ApiClient {
    pub fn new(endpoints: Arc<Endpoints>, proxy: Option<&ProxyEndpoint>) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy.to_reqwest()?);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http, endpoints })
    }

    /// Exchange a raw address for a bearer token.
    pub async fn generate_token(&self, address: &str) -> Result<SecretString, ApiError> {
        const ENDPOINT: &str = "generate_token";
        let request = self
            .http
            .post(self.endpoints.api(paths::GENERATE_TOKEN))
            .json(&json!({ "address": address }));
        let envelope: Envelope<TokenData> = send(ENDPOINT, request).await?;
        envelope
            .data
            .and_then(|d| d.token)
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or(ApiError::MissingField {
                endpoint: ENDPOINT,
                field: "data.token",
            })
    }

    /// Remote account id of the token's owner, as a display string.
    pub async fn account_id(&self, token: &SecretString) -> Result<String, ApiError> {
        const ENDPOINT: &str = "users/me";
        let envelope: Envelope<AccountData> =
            self.get(ENDPOINT, self.endpoints.api(paths::USERS_ME), token).await?;
        envelope
            .data
            .and_then(|d| d.id)
            .as_ref()
            .and_then(id_label)
            .ok_or(ApiError::MissingField {
                endpoint: ENDPOINT,
                field: "data.id",
            })
    }

    /// Heartbeats counted for the current period.
    pub async fn total_heartbeats(&self, token: &SecretString) -> Result<u64, ApiError> {
        let envelope: Envelope<Vec<RealtimeEntry>> = self
            .get(
                "reward_realtime",
                self.endpoints.rewards(paths::REWARD_REALTIME),
                token,
            )
            .await?;
        let first = envelope.data.unwrap_or_default().into_iter().next();
        Ok(lenient_u64(first.and_then(|e| e.total_heartbeats).as_ref()))
    }

    /// Reward ledger. Fetched for parity with the extension; contents are unused.
    pub async fn reward_history(&self, token: &SecretString) -> Result<Value, ApiError> {
        let envelope: Envelope<Value> = self
            .get(
                "reward_history",
                self.endpoints.rewards(paths::REWARD_HISTORY),
                token,
            )
            .await?;
        Ok(envelope.data.unwrap_or(Value::Null))
    }

    pub async fn epoch_reward(&self, token: &SecretString) -> Result<EpochReward, ApiError> {
        let envelope: Envelope<EpochRewardData> = self
            .get("reward", self.endpoints.rewards(paths::REWARD), token)
            .await?;
        let data = envelope.data;
        Ok(EpochReward {
            total_point: lenient_f64(data.as_ref().and_then(|d| d.total_point.as_ref())),
            name: data.and_then(|d| d.name).unwrap_or_default(),
        })
    }

    /// Whether today's reward has already been claimed.
    pub async fn claim_details(&self, token: &SecretString) -> Result<bool, ApiError> {
        let envelope: Envelope<ClaimDetailsData> = self
            .get(
                "claim_details",
                self.endpoints.rewards(paths::CLAIM_DETAILS),
                token,
            )
            .await?;
        Ok(envelope.data.and_then(|d| d.claimed).unwrap_or(false))
    }

    /// Claim today's reward. `true` when the service reports success.
    pub async fn claim_reward(&self, token: &SecretString) -> Result<bool, ApiError> {
        let envelope: Envelope<Value> = self
            .get(
                "claim_reward",
                self.endpoints.rewards(paths::CLAIM_REWARD),
                token,
            )
            .await?;
        Ok(envelope.is_success())
    }

    /// Claim one medal tier. `true` only when the tier was actually granted.
    pub async fn claim_tier(&self, token: &SecretString, tier_id: u8) -> Result<bool, ApiError> {
        let request = self
            .http
            .put(self.endpoints.rewards(paths::CLAIM_TIER))
            .bearer_auth(token.expose_secret())
            .json(&json!({ "tierId": tier_id }));
        let envelope: Envelope<Value> = send("claim_tier", request).await?;
        Ok(envelope.is_success() && envelope.data == Some(Value::Bool(true)))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: String,
        token: &SecretString,
    ) -> Result<Envelope<T>, ApiError> {
        let request = self.http.get(url).bearer_auth(token.expose_secret());
        send(endpoint, request).await
    }
}

async fn send<T: DeserializeOwned>(
    endpoint: &'static str,
    request: RequestBuilder,
) -> Result<Envelope<T>, ApiError> {
    let response = request.send().await.map_err(|e| ApiError::Request {
        endpoint,
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status { endpoint, status });
    }

    response.json().await.map_err(|e| ApiError::Request {
        endpoint,
        reason: e.to_string(),
    })
}
