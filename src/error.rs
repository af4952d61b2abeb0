//! Error types for the worker fleet.

use std::path::PathBuf;

/// Startup configuration and input-file errors. All of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("{path} contains no entries")]
    EmptyInput { path: PathBuf },

    #[error(
        "The number of proxies ({proxies}) is less than the number of wallets ({identities}). \
         Please provide enough proxies."
    )]
    InsufficientProxies { proxies: usize, identities: usize },

    #[error("Invalid proxy '{proxy}': {reason}")]
    InvalidProxy { proxy: String, reason: String },

    #[error("Invalid resource catalogue {path}: {reason}")]
    InvalidCatalogue { path: PathBuf, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Identity store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote HTTP API errors. Every variant is treated as transient by callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{endpoint} request failed: {reason}")]
    Request {
        endpoint: &'static str,
        reason: String,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{endpoint} response is missing {field}")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },
}

/// Websocket transport errors. Any of these ends the current connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid websocket URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to reach {target}: {reason}")]
    Dial { target: String, reason: String },

    #[error("Proxy {proxy} refused tunnel: {status_line}")]
    ProxyRefused { proxy: String, status_line: String },

    #[error("Websocket handshake failed: {0}")]
    Handshake(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),
}
