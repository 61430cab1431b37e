//! Transport client construction and error mapping.

use std::time::Duration;

use tracing::debug;

use quay_core::error::TransportError;
use quay_core::{Error, ProxyInfo, Result};

/// TLS trust policy for a session.
///
/// `TrustAll` disables certificate validation and is a deliberate,
/// explicit per-connection opt-in for environments with self-signed
/// certificates. It is never a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    /// Validate server certificates against the platform trust store.
    #[default]
    Verify,
    /// Accept any server certificate.
    TrustAll,
}

/// Build a transport client with the session's timeouts, trust policy,
/// and proxy routing.
///
/// The proxy is attached only when `target_host` is not covered by the
/// proxy's ignored-hosts list. The cookie store is always enabled: the
/// form-login handshake is cookie-backed.
pub(crate) fn build_client(
    target_host: &str,
    timeout: Duration,
    trust: TrustPolicy,
    proxy: &ProxyInfo,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("quay/", env!("CARGO_PKG_VERSION")))
        .cookie_store(true)
        .connect_timeout(timeout)
        .timeout(timeout);

    if trust == TrustPolicy::TrustAll {
        debug!(host = target_host, "trusting all server certificates");
        builder = builder.danger_accept_invalid_certs(true);
    }

    if proxy.should_proxy(target_host) {
        if let Some(url) = proxy.url() {
            debug!(proxy = %url, "routing through forward proxy");
            let mut p = reqwest::Proxy::all(&url).map_err(map_error)?;
            if let Some(credentials) = proxy.credentials() {
                p = p.basic_auth(&credentials.username, &credentials.password);
            }
            builder = builder.proxy(p);
        }
    }

    builder.build().map_err(map_error)
}

/// Map a transport-library error into the crate's transport taxonomy.
pub(crate) fn map_error(err: reqwest::Error) -> Error {
    let transport = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    Error::Transport(transport)
}
