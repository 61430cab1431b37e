//! Challenge-driven authentication.
//!
//! A [`ChallengeAuthenticator`] holds a registry mapping scheme names to
//! concrete handlers. Given the challenges from a 401/407 response it
//! selects the first challenge (in header order) whose scheme has a
//! registered handler, matched case-insensitively, and returns that
//! handler's computed authorization header value.

mod basic;
mod bearer;
mod digest;
mod ntlm;

pub use basic::BasicHandler;
pub use bearer::{BearerHandler, TokenServiceHandler};
pub use digest::DigestHandler;
pub use ntlm::{HandshakeState, NtlmHandler};

use std::collections::HashMap;

use tracing::debug;

use quay_core::error::AuthError;
use quay_core::{AuthChallenge, ChallengeContext, ProxyCredentials, Result, SchemeHandler};

/// Challenge header on a direct 401.
pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
/// Challenge header on a proxy 407.
pub const PROXY_AUTHENTICATE: &str = "Proxy-Authenticate";
/// Response header for a direct challenge.
pub const AUTHORIZATION: &str = "Authorization";
/// Response header for a proxy challenge.
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Scheme-dispatching authenticator.
///
/// Produces a retry-ready authorization header value; never mutates
/// session state (storing the result is the caller's responsibility).
pub struct ChallengeAuthenticator {
    registry: HashMap<String, Box<dyn SchemeHandler>>,
}

impl ChallengeAuthenticator {
    /// Build the default registry (basic, digest, NTLM) from one set of
    /// credentials.
    pub fn new(credentials: ProxyCredentials) -> Self {
        let basic = BasicHandler::new(&credentials.username, &credentials.password);
        let digest = DigestHandler::new(&credentials.username, &credentials.password);
        let ntlm = NtlmHandler::new(
            &credentials.username,
            &credentials.password,
            credentials.ntlm_domain.as_deref().unwrap_or(""),
            credentials.ntlm_workstation.as_deref().unwrap_or(""),
        );

        Self {
            registry: HashMap::new(),
        }
        .with_handler(Box::new(basic))
        .with_handler(Box::new(digest))
        .with_handler(Box::new(ntlm))
    }

    /// An authenticator with an empty registry.
    pub fn empty() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    /// Register a handler, replacing any existing handler for the same
    /// scheme.
    pub fn with_handler(mut self, handler: Box<dyn SchemeHandler>) -> Self {
        self.registry
            .insert(handler.scheme().to_ascii_lowercase(), handler);
        self
    }

    /// The request header that carries the computed credential, based on
    /// whether the connection is routed through a forward proxy.
    pub fn response_header(via_proxy: bool) -> &'static str {
        if via_proxy {
            PROXY_AUTHORIZATION
        } else {
            AUTHORIZATION
        }
    }

    /// Select the first challenge with a registered handler and execute
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnsupportedScheme`] carrying the raw
    /// challenge list when no registered scheme matches. That failure is
    /// never retried.
    pub async fn authenticate(
        &self,
        challenges: &[AuthChallenge],
        context: &ChallengeContext,
    ) -> Result<String> {
        for challenge in challenges {
            if let Some(handler) = self.registry.get(&challenge.scheme.to_ascii_lowercase()) {
                debug!(scheme = %challenge.scheme, "answering auth challenge");
                return handler.respond(challenge, context).await;
            }
        }
        Err(AuthError::UnsupportedScheme {
            challenges: challenges.iter().map(ToString::to_string).collect(),
        }
        .into())
    }
}

impl std::fmt::Debug for ChallengeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.registry.keys().collect();
        schemes.sort();
        f.debug_struct("ChallengeAuthenticator")
            .field("schemes", &schemes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::Error;

    fn context() -> ChallengeContext {
        ChallengeContext::new("GET", "/api/projects")
    }

    fn authenticator() -> ChallengeAuthenticator {
        ChallengeAuthenticator::new(ProxyCredentials::new("a", "b"))
    }

    #[tokio::test]
    async fn selects_first_registered_scheme_in_header_order() {
        let challenges =
            AuthChallenge::parse_headers(&["Negotiate", r#"Basic realm="fallback""#]);
        let value = authenticator()
            .authenticate(&challenges, &context())
            .await
            .unwrap();
        assert!(value.starts_with("Basic "));
    }

    #[tokio::test]
    async fn scheme_match_is_case_insensitive() {
        let challenges = AuthChallenge::parse_headers(&[r#"BASIC realm="upper""#]);
        let value = authenticator()
            .authenticate(&challenges, &context())
            .await
            .unwrap();
        assert_eq!(value, "Basic YTpi");
    }

    #[tokio::test]
    async fn unsupported_scheme_carries_raw_challenges() {
        let challenges = AuthChallenge::parse_headers(&["Negotiate", "Kerberos"]);
        let err = authenticator()
            .authenticate(&challenges, &context())
            .await
            .unwrap_err();
        match err {
            Error::Auth(AuthError::UnsupportedScheme { challenges }) => {
                assert_eq!(challenges, vec!["Negotiate", "Kerberos"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_registry_supports_nothing() {
        let challenges = AuthChallenge::parse_headers(&[r#"Basic realm="r""#]);
        let result = ChallengeAuthenticator::empty()
            .authenticate(&challenges, &context())
            .await;
        assert!(matches!(
            result,
            Err(Error::Auth(AuthError::UnsupportedScheme { .. }))
        ));
    }

    #[test]
    fn response_header_follows_routing() {
        assert_eq!(
            ChallengeAuthenticator::response_header(true),
            PROXY_AUTHORIZATION
        );
        assert_eq!(ChallengeAuthenticator::response_header(false), AUTHORIZATION);
    }
}
