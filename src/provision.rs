//! Credential provisioning: raw address to usable session.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::identity::{Identity, Session};
use crate::retry::Retry;
use crate::shutdown::{Cancelled, Shutdown};
use crate::store::IdentityStore;

/// Obtains and persists bearer tokens.
#[derive(Clone)]
pub struct CredentialProvisioner {
    store: Arc<IdentityStore>,
    retry: Retry,
    shutdown: Shutdown,
}

impl CredentialProvisioner {
    pub fn new(store: Arc<IdentityStore>, retry_delay: Duration, shutdown: Shutdown) -> Self {
        Self {
            store,
            retry: Retry::unbounded(retry_delay),
            shutdown,
        }
    }

    /// Produce a session for `identity`, requesting a token if the record has none.
    ///
    /// Token requests are retried with a fixed delay for as long as it takes;
    /// the only early exit is shutdown. An existing token is reused as is.
    pub async fn provision(&self, identity: &Identity) -> Result<Session, Cancelled> {
        let record = self.store.get_or_create(&identity.address).await;

        let token = match record.token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                let what = format!("generating token for wallet {}", identity.address);
                let address = identity.address.as_str();
                let issued = self
                    .retry
                    .run(&what, &self.shutdown, move |_| {
                        identity.api.generate_token(address)
                    })
                    .await
                    // Unbounded retry only stops on shutdown.
                    .map_err(|_| Cancelled)?;

                info!("Generated token for wallet {}", identity.address);
                self.store
                    .set_token_if_absent(&identity.address, issued.expose_secret().to_string())
                    .await
            }
        };

        Ok(Session {
            address: record.address,
            worker_id: record.worker_id,
            session_id: record.session_id,
            token: SecretString::from(token),
        })
    }
}
