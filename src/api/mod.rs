//! Remote token, account and reward API.

pub mod client;
pub mod rewards;
pub mod types;

pub use client::ApiClient;
pub use rewards::{AccountDetails, ClaimOutcome, MEDAL_TIERS, RewardClient};
pub use types::EpochReward;
