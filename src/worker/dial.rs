//! Websocket dialing, directly or through an HTTP CONNECT proxy tunnel.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{
    ACCEPT_ENCODING, ACCEPT_LANGUAGE, CACHE_CONTROL, ORIGIN, PRAGMA, SEC_WEBSOCKET_KEY, USER_AGENT,
};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, client_async_tls_with_config};
use tracing::debug;

use super::protocol::EXTENSION_HOST;
use crate::error::TransportError;
use crate::proxy::ProxyEndpoint;

/// Live orchestrator socket.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Opens the TCP stream a websocket handshake runs over.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, TransportError>;
}

/// Plain TCP to the target.
pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::Dial {
                target: format!("{host}:{port}"),
                reason: e.to_string(),
            })
    }
}

/// TCP to an HTTP proxy, then `CONNECT host:port`.
///
/// `ProxyEndpoint::parse` only admits `http` proxies.
pub struct TunnelDialer {
    proxy: ProxyEndpoint,
}

impl TunnelDialer {
    pub fn new(proxy: ProxyEndpoint) -> Self {
        Self { proxy }
    }

    fn authorization(&self) -> Option<String> {
        let url = self.proxy.url();
        if url.username().is_empty() {
            return None;
        }
        let credentials = format!("{}:{}", url.username(), url.password().unwrap_or(""));
        Some(format!("Basic {}", STANDARD.encode(credentials)))
    }
}

#[async_trait]
impl Dialer for TunnelDialer {
    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let url = self.proxy.url();
        let proxy_host = url.host_str().unwrap_or_default();
        let proxy_port = url.port_or_known_default().unwrap_or(80);
        let dial_err = |reason: String| TransportError::Dial {
            target: self.proxy.to_string(),
            reason,
        };

        let mut stream = TcpStream::connect((proxy_host, proxy_port))
            .await
            .map_err(|e| dial_err(e.to_string()))?;

        let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
        if let Some(auth) = self.authorization() {
            request.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
        }
        request.push_str("\r\n");
        stream
            .write_all(request.as_bytes())
            .await
            .map_err(|e| dial_err(e.to_string()))?;

        // Read the proxy's reply headers byte-exact so nothing past the blank
        // line is consumed from the tunnel.
        let mut reader = BufReader::with_capacity(1, &mut stream);
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .await
            .map_err(|e| dial_err(e.to_string()))?;
        loop {
            let mut line = String::new();
            let n = reader
                .read_line(&mut line)
                .await
                .map_err(|e| dial_err(e.to_string()))?;
            if n == 0 || line == "\r\n" || line == "\n" {
                break;
            }
        }

        let status_line = status_line.trim().to_string();
        let accepted = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code.starts_with('2'));
        if !accepted {
            return Err(TransportError::ProxyRefused {
                proxy: self.proxy.to_string(),
                status_line,
            });
        }

        debug!(proxy = %self.proxy, dest = %format!("{host}:{port}"), "Proxy tunnel established");
        Ok(stream)
    }
}

/// Dialer for an identity's optional proxy.
pub fn dialer_for(proxy: Option<&ProxyEndpoint>) -> Arc<dyn Dialer> {
    match proxy {
        Some(proxy) => Arc::new(TunnelDialer::new(proxy.clone())),
        None => Arc::new(DirectDialer),
    }
}

/// Orchestrator URL carrying the session token.
pub fn orchestrator_url(base: &str, token: &SecretString) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}authToken={}", token.expose_secret())
}

/// Open a websocket to `url` over `dialer` with the extension's header set
/// and a fresh random handshake key.
pub async fn connect(url: &str, dialer: &dyn Dialer) -> Result<WsStream, TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: redact_query(url),
        reason,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| invalid(e.to_string()))?;

    let (host, port, secure) = {
        let uri = request.uri();
        let secure = match uri.scheme_str() {
            Some("wss") => true,
            Some("ws") => false,
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        };
        let host = uri
            .host()
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        (host, port, secure)
    };

    let headers = request.headers_mut();
    headers.insert(SEC_WEBSOCKET_KEY, header(&generate_key()));
    headers.insert(ORIGIN, HeaderValue::from_static(EXTENSION_HOST));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br, zstd"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,id;q=0.8"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    let stream = dialer.dial(&host, port).await?;
    let connector = if secure { Some(tls_connector()?) } else { None };

    let (ws, _response) = client_async_tls_with_config(request, stream, None, connector)
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    Ok(ws)
}

fn header(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn tls_connector() -> Result<Connector, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| TransportError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}

/// URL with its query string removed, for log and error text.
pub fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?…"),
        None => url.to_string(),
    }
}
