//! Account and reward operations with their retry policies.
//!
//! - `fetch_account_id` retries without limit; nothing downstream runs without it.
//! - `fetch_account_details` and `check_and_claim_reward` retry a bounded number
//!   of times and give up quietly.
//! - `claim_medals` is a best-effort sweep with no retries.

use std::ops::RangeInclusive;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::config::Timing;
use crate::error::ApiError;
use crate::identity::Identity;
use crate::retry::Retry;
use crate::shutdown::{Cancelled, Shutdown};
use crate::store::IdentityStore;

/// Medal tiers swept by `claim_medals`.
pub const MEDAL_TIERS: RangeInclusive<u8> = 1..=8;

/// Reward standing shown in the periodic account-details line.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDetails {
    pub heartbeats: u64,
    pub epoch_points: f64,
    pub epoch_name: String,
}

impl AccountDetails {
    /// Heartbeats plus the current epoch's points.
    pub fn total(&self) -> f64 {
        self.heartbeats as f64 + self.epoch_points
    }
}

/// Result of one reward-claim check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Claim-status said the reward was already taken.
    AlreadyClaimed,
    /// The claim call reported success.
    Claimed,
    /// The claim call answered without a success status.
    NotConfirmed,
}

/// Reward and account calls shared by every identity pipeline.
#[derive(Clone)]
pub struct RewardClient {
    store: Arc<IdentityStore>,
    lookup: Retry,
    bounded: Retry,
    shutdown: Shutdown,
}

impl RewardClient {
    pub fn new(store: Arc<IdentityStore>, timing: &Timing, shutdown: Shutdown) -> Self {
        Self {
            store,
            lookup: Retry::unbounded(timing.retry_delay),
            bounded: Retry::bounded(timing.retry_attempts, timing.retry_delay),
            shutdown,
        }
    }

    /// Resolve and record the remote account id. Retries until success or shutdown.
    pub async fn fetch_account_id(
        &self,
        identity: &Identity,
        token: &SecretString,
    ) -> Result<String, Cancelled> {
        let what = format!("getting accountID for wallet {}", identity.address);
        let account_id = self
            .lookup
            .run(&what, &self.shutdown, move |_| identity.api.account_id(token))
            .await
            // Unbounded retry only stops on shutdown.
            .map_err(|_| Cancelled)?;

        self.store
            .set_account_id(&identity.address, account_id.clone())
            .await;
        info!(account_id = %account_id, "AccountID {}, Proxy: {}", account_id, identity.proxy_label());
        Ok(account_id)
    }

    /// Fetch heartbeat count, reward ledger and epoch reward, and log the total.
    ///
    /// Returns `None` after the bounded retries are used up or on shutdown.
    pub async fn fetch_account_details(
        &self,
        identity: &Identity,
        token: &SecretString,
    ) -> Option<AccountDetails> {
        let what = format!("getting account details for wallet {}", identity.address);
        let details = self
            .bounded
            .run(&what, &self.shutdown, move |_| async move {
                let heartbeats = identity.api.total_heartbeats(token).await?;
                identity.api.reward_history(token).await?;
                let epoch = identity.api.epoch_reward(token).await?;
                Ok::<_, ApiError>(AccountDetails {
                    heartbeats,
                    epoch_points: epoch.total_point,
                    epoch_name: epoch.name,
                })
            })
            .await
            .ok()?;

        let account_id = self.store.account_label(&identity.address).await;
        info!(
            account_id = %account_id,
            "Wallet {}, AccountID {}, Total Heartbeat {}, Total Points {:.2} ({}), Proxy: {}",
            identity.address,
            account_id,
            details.heartbeats,
            details.total(),
            details.epoch_name,
            identity.proxy_label()
        );
        Some(details)
    }

    /// Check claim status and claim the daily reward when it is still open.
    ///
    /// The claim call is never made when the status says it was already claimed.
    pub async fn check_and_claim_reward(
        &self,
        identity: &Identity,
        token: &SecretString,
    ) -> Option<ClaimOutcome> {
        let what = format!("claiming reward for wallet {}", identity.address);
        let outcome = self
            .bounded
            .run(&what, &self.shutdown, move |_| async move {
                if identity.api.claim_details(token).await? {
                    return Ok::<_, ApiError>(ClaimOutcome::AlreadyClaimed);
                }
                if identity.api.claim_reward(token).await? {
                    Ok(ClaimOutcome::Claimed)
                } else {
                    Ok(ClaimOutcome::NotConfirmed)
                }
            })
            .await
            .ok()?;

        if outcome == ClaimOutcome::Claimed {
            let account_id = self.store.account_label(&identity.address).await;
            info!(
                account_id = %account_id,
                "Wallet {}, AccountID {} Claimed daily reward successfully!",
                identity.address,
                account_id
            );
        }
        Some(outcome)
    }

    /// Try every medal tier once. Failed tiers are skipped silently.
    ///
    /// Returns the tiers that were granted.
    pub async fn claim_medals(&self, identity: &Identity, token: &SecretString) -> Vec<u8> {
        let mut granted = Vec::new();
        for tier_id in MEDAL_TIERS {
            if self.shutdown.is_triggered() {
                break;
            }
            match identity.api.claim_tier(token, tier_id).await {
                Ok(true) => {
                    info!(
                        "Wallet {}: Successfully claimed medal for tier {}",
                        identity.address, tier_id
                    );
                    granted.push(tier_id);
                }
                Ok(false) | Err(_) => {}
            }
        }
        granted
    }
}
