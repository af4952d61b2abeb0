//! A managed identity: credential, position in the list, proxy and API client.

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{Span, info_span};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::Endpoints;
use crate::error::ConfigError;
use crate::proxy::{ProxyEndpoint, ProxyPool, proxy_label};

/// One credential and the fixed per-process resources derived from it.
#[derive(Debug)]
pub struct Identity {
    /// Zero-based position in the credential list.
    pub index: usize,
    pub address: String,
    pub proxy: Option<ProxyEndpoint>,
    pub api: ApiClient,
}

impl Identity {
    pub fn new(
        index: usize,
        address: impl Into<String>,
        proxy: Option<ProxyEndpoint>,
        endpoints: Arc<Endpoints>,
    ) -> Result<Self, ConfigError> {
        let api = ApiClient::new(endpoints, proxy.as_ref())?;
        Ok(Self {
            index,
            address: address.into(),
            proxy,
            api,
        })
    }

    /// Build one identity per credential with proxies assigned by position.
    pub fn from_credentials(
        credentials: &[String],
        proxies: &ProxyPool,
        endpoints: Arc<Endpoints>,
    ) -> Result<Vec<Arc<Self>>, ConfigError> {
        credentials
            .iter()
            .enumerate()
            .map(|(index, address)| {
                let proxy = proxies.assign(index).cloned();
                Self::new(index, address.as_str(), proxy, Arc::clone(&endpoints)).map(Arc::new)
            })
            .collect()
    }

    /// One-based number used in log lines.
    pub fn ordinal(&self) -> usize {
        self.index + 1
    }

    pub fn proxy_label(&self) -> &str {
        proxy_label(self.proxy.as_ref())
    }

    /// Span annotating every log line emitted on this identity's behalf.
    pub fn span(&self) -> Span {
        info_span!("identity", n = self.ordinal(), proxy = %self.proxy_label())
    }
}

/// Provisioned session materials, reused unchanged across reconnects.
#[derive(Debug)]
pub struct Session {
    pub address: String,
    pub worker_id: String,
    pub session_id: Uuid,
    pub token: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_follow_proxy_rotation() {
        let credentials: Vec<String> = (0..5).map(|i| format!("0x{i}")).collect();
        let raw: Vec<String> = vec!["http://p0:1".into(), "http://p1:1".into()];
        let pool = ProxyPool::parse_all(&raw, true).unwrap();
        let identities =
            Identity::from_credentials(&credentials, &pool, Arc::new(Endpoints::default()))
                .unwrap();

        let labels: Vec<&str> = identities.iter().map(|i| i.proxy_label()).collect();
        assert_eq!(
            labels,
            vec!["http://p0:1", "http://p1:1", "http://p0:1", "http://p1:1", "http://p0:1"]
        );
        assert_eq!(identities[4].ordinal(), 5);
    }

    #[test]
    fn declined_proxies_mean_direct_traffic() {
        let credentials = vec!["0xa".to_string()];
        let raw = vec!["http://p0:1".to_string()];
        let pool = ProxyPool::parse_all(&raw, false).unwrap();
        let identities =
            Identity::from_credentials(&credentials, &pool, Arc::new(Endpoints::default()))
                .unwrap();
        assert!(identities[0].proxy.is_none());
        assert_eq!(identities[0].proxy_label(), "False");
    }
}
