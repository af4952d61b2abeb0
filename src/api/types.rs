//! Wire types for the token, account and reward endpoints.
//!
//! The service is loose about numeric types (counts arrive as numbers or
//! numeric strings), so numeric fields are kept as raw JSON values and read
//! through the lenient helpers below.

use serde::Deserialize;
use serde_json::Value;

/// Status value the service uses for successful actions.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Common `{ status, data }` response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS)
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenData {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountData {
    pub id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RealtimeEntry {
    pub total_heartbeats: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct EpochRewardData {
    #[serde(rename = "totalPoint")]
    pub total_point: Option<Value>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimDetailsData {
    pub claimed: Option<bool>,
}

/// Current epoch standing.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReward {
    pub total_point: f64,
    pub name: String,
}

/// Integer from a number or numeric string; anything else reads as 0.
pub fn lenient_u64(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Float from a number or numeric string; anything else reads as 0.
pub fn lenient_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Display form of an id that may be a number or a string.
pub fn id_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
