//! Startup input lists: credentials, proxies and the compute catalogue.
//!
//! Everything here runs before any network call; a failure aborts the process.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use crate::config::InputPaths;
use crate::error::ConfigError;
use crate::resources::DEFAULT_CATALOGUE;

/// Loaded, validated startup inputs.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub credentials: Vec<String>,
    pub proxies: Vec<String>,
    pub catalogue: Vec<String>,
}

impl Inputs {
    pub fn load(paths: &InputPaths) -> Result<Self, ConfigError> {
        let credentials = load_credentials(&paths.accounts)?;
        let proxies = load_proxies(&paths.proxies);
        check_proxy_count(proxies.len(), credentials.len())?;
        let catalogue = load_catalogue(&paths.catalogue)?;

        info!(
            identities = credentials.len(),
            proxies = proxies.len(),
            catalogue = catalogue.len(),
            "Inputs loaded"
        );

        Ok(Self {
            credentials,
            proxies,
            catalogue,
        })
    }
}

/// Split a whitespace-delimited list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// The credential list is required and must not be empty.
pub fn load_credentials(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let credentials = parse_list(&raw);
    if credentials.is_empty() {
        return Err(ConfigError::EmptyInput {
            path: path.to_path_buf(),
        });
    }
    Ok(credentials)
}

/// The proxy list is optional; an unreadable file means no proxies.
pub fn load_proxies(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(raw) => parse_list(&raw),
        Err(e) => {
            warn!("Error reading {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// A non-empty proxy list must cover every identity.
pub fn check_proxy_count(proxies: usize, identities: usize) -> Result<(), ConfigError> {
    if proxies > 0 && proxies < identities {
        return Err(ConfigError::InsufficientProxies {
            proxies,
            identities,
        });
    }
    Ok(())
}

/// JSON array of compute descriptors, or the built-in list when the file is absent.
pub fn load_catalogue(path: &Path) -> Result<Vec<String>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(DEFAULT_CATALOGUE.iter().map(|s| s.to_string()).collect());
        }
        Err(e) => {
            return Err(ConfigError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    };

    let catalogue: Vec<String> =
        serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidCatalogue {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if catalogue.is_empty() {
        return Err(ConfigError::InvalidCatalogue {
            path: path.to_path_buf(),
            reason: "catalogue is empty".to_string(),
        });
    }
    Ok(catalogue)
}
