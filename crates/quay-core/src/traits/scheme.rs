//! Challenge scheme handler trait.

use async_trait::async_trait;

use crate::challenge::AuthChallenge;
use crate::Result;

/// Request context a scheme handler may need to compute its response.
///
/// Digest authentication hashes the request method and URI into the
/// response; other schemes ignore both.
#[derive(Debug, Clone)]
pub struct ChallengeContext {
    /// Method of the request being retried.
    pub method: String,
    /// Request-URI of the request being retried (path and query).
    pub uri: String,
}

impl ChallengeContext {
    /// Context for the given method and request-URI.
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
        }
    }
}

/// A handler for one authentication scheme.
///
/// Handlers are pure with respect to the session: they compute an
/// authorization header value from a challenge and their own credential
/// material, and never mutate session state. Handlers for stateful
/// protocols (NTLM) keep their handshake state internally.
#[async_trait]
pub trait SchemeHandler: Send + Sync {
    /// The scheme name this handler answers, e.g. `basic`.
    fn scheme(&self) -> &str;

    /// Compute the authorization header value for `challenge`.
    async fn respond(&self, challenge: &AuthChallenge, context: &ChallengeContext)
        -> Result<String>;
}
