//! Error types for the quay client toolkit.
//!
//! This module provides a unified error type with explicit variants for
//! configuration, transport, authentication, request, and pagination
//! failures. Callers see exactly one typed failure per operation.

use std::fmt;
use thiserror::Error;

/// The unified error type for quay operations.
///
/// Every fallible operation in the toolkit resolves to one of these
/// variants, with enough context (status code, URI, scheme name) to
/// diagnose a failure without re-running with tracing enabled.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing base URL, incomplete proxy settings).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network transport errors (DNS, TLS, connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (rejected handshake, unsupported scheme,
    /// failed token exchange).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A request that returned non-2xx after exhausting retries.
    #[error("request failed: {0}")]
    Request(#[from] RequestFailure),

    /// Pagination errors (stalled collection, malformed page body).
    #[error("pagination error: {0}")]
    Page(#[from] PageError),

    /// The request or its retry chain was cancelled mid-flight.
    #[error("operation cancelled")]
    Cancelled,
}

/// Configuration errors, reported before any network traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No base URL was provided.
    #[error("missing base URL")]
    MissingBaseUrl,

    /// The base or token URL failed validation.
    #[error("invalid URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    /// No credential was provided.
    #[error("missing credential")]
    MissingCredential,

    /// Timeout must be greater than zero.
    #[error("invalid timeout: {seconds} seconds")]
    InvalidTimeout { seconds: u64 },

    /// Proxy port was given without a host.
    #[error("proxy port configured without a proxy host")]
    MissingProxyHost,

    /// Proxy host was given without a port.
    #[error("proxy host configured without a proxy port")]
    MissingProxyPort,

    /// An OAuth credential was configured without a token source.
    #[error("OAuth credential requires a token source")]
    MissingTokenSource,

    /// An authorization-code exchange was requested without a callback URL.
    #[error("authorization-code exchange requires a callback URL")]
    MissingCallbackUrl,
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// TLS/certificate error.
    #[error("TLS error: {message}")]
    Tls { message: String },

    /// Generic HTTP transport error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authentication handshake was rejected by the server.
    #[error("handshake rejected: {status} {reason}")]
    HandshakeFailed { status: u16, reason: String },

    /// No registered handler matches any of the server's challenges.
    ///
    /// Carries the raw challenge list as received. Never retried.
    #[error("unsupported auth scheme: {}", challenges.join(", "))]
    UnsupportedScheme { challenges: Vec<String> },

    /// A challenge was matched but its parameters are unusable.
    #[error("invalid {scheme} challenge: {reason}")]
    ChallengeInvalid { scheme: String, reason: String },

    /// A user-grant refresh was requested with no refresh token stored.
    #[error("no refresh token present to refresh")]
    MissingRefreshToken,

    /// The token endpoint was unreachable, returned non-2xx, or returned
    /// a malformed body.
    #[error("token exchange failed: {reason}")]
    TokenExchange { reason: String },

    /// The authenticate endpoint returned 2xx but the token body could
    /// not be parsed.
    #[error("malformed token body: {reason}")]
    MalformedTokenBody { reason: String },
}

/// A non-2xx response after the retry ceiling was exhausted.
///
/// Carries the HTTP status, the reason phrase (when the transport exposes
/// one), and the method and URI of the failed request.
#[derive(Debug)]
pub struct RequestFailure {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase, if known.
    pub reason: Option<String>,
    /// Request method.
    pub method: String,
    /// Target URI of the failed request.
    pub uri: String,
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref reason) = self.reason {
            write!(f, " {}", reason)?;
        }
        write!(f, ": {} {}", self.method, self.uri)
    }
}

impl std::error::Error for RequestFailure {}

impl RequestFailure {
    /// Create a new request failure.
    pub fn new(status: u16, reason: Option<String>, method: &str, uri: &str) -> Self {
        Self {
            status,
            reason,
            method: method.to_string(),
            uri: uri.to_string(),
        }
    }
}

/// Pagination errors.
#[derive(Debug, Error)]
pub enum PageError {
    /// The server returned an empty page before the reported total was
    /// reached.
    #[error("pagination stalled: received {received} of {expected} items")]
    Stalled { received: u64, expected: u64 },

    /// A page body is missing a required field.
    #[error("page body missing field '{name}'")]
    MissingField { name: String },

    /// A page item could not be deserialized into the expected shape.
    #[error("page item could not be deserialized: {reason}")]
    InvalidItem { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failure_display_includes_context() {
        let failure = RequestFailure::new(
            401,
            Some("Unauthorized".to_string()),
            "GET",
            "https://example.test/api/projects",
        );
        let rendered = failure.to_string();
        assert!(rendered.contains("401"));
        assert!(rendered.contains("Unauthorized"));
        assert!(rendered.contains("GET"));
        assert!(rendered.contains("/api/projects"));
    }

    #[test]
    fn request_failure_display_without_reason() {
        let failure = RequestFailure::new(503, None, "POST", "https://example.test/");
        assert_eq!(failure.to_string(), "HTTP 503: POST https://example.test/");
    }

    #[test]
    fn unsupported_scheme_lists_raw_challenges() {
        let err = AuthError::UnsupportedScheme {
            challenges: vec!["Negotiate".to_string(), "Kerberos".to_string()],
        };
        assert!(err.to_string().contains("Negotiate, Kerberos"));
    }
}
