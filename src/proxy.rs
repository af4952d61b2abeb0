//! Per-identity outbound proxy assignment.

use std::fmt;

use reqwest::Url;

use crate::error::ConfigError;

/// A parsed proxy endpoint. Bare `host:port` entries are read as HTTP proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    raw: String,
    url: Url,
}

impl ProxyEndpoint {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let url = Url::parse(&candidate).map_err(|e| ConfigError::InvalidProxy {
            proxy: raw.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" {
            return Err(ConfigError::InvalidProxy {
                proxy: raw.to_string(),
                reason: format!("unsupported scheme '{}', only http proxies can tunnel", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidProxy {
                proxy: raw.to_string(),
                reason: "missing host".to_string(),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// The entry as written in the proxy list.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `reqwest` proxy routing every scheme through this endpoint.
    pub fn to_reqwest(&self) -> Result<reqwest::Proxy, ConfigError> {
        reqwest::Proxy::all(self.url.clone()).map_err(|e| ConfigError::InvalidProxy {
            proxy: self.raw.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The ordered proxy list and whether the operator chose to use it.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    proxies: Vec<ProxyEndpoint>,
    enabled: bool,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyEndpoint>, enabled: bool) -> Self {
        Self { proxies, enabled }
    }

    pub fn parse_all(raw: &[String], enabled: bool) -> Result<Self, ConfigError> {
        let proxies = raw
            .iter()
            .map(|p| ProxyEndpoint::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(proxies, enabled))
    }

    /// Proxy for identity `index`: `proxies[index mod len]`, or none when the
    /// list is empty or proxies are disabled.
    pub fn assign(&self, index: usize) -> Option<&ProxyEndpoint> {
        if !self.enabled || self.proxies.is_empty() {
            return None;
        }
        self.proxies.get(index % self.proxies.len())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Log label for an optional proxy.
pub fn proxy_label(proxy: Option<&ProxyEndpoint>) -> &str {
    proxy.map(ProxyEndpoint::as_str).unwrap_or("False")
}
