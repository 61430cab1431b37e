//! Bearer-token and token-service scheme handlers.
//!
//! Both delegate to a [`TokenSource`]: the bearer handler attaches the
//! source's current token, while the token-service handler forces a
//! fresh exchange before answering.

use std::sync::Arc;

use async_trait::async_trait;

use quay_core::{AuthChallenge, ChallengeContext, Grant, Result, SchemeHandler, TokenSource};

/// Answers a `Bearer` challenge with the token source's current token.
pub struct BearerHandler {
    source: Arc<dyn TokenSource>,
    grant: Grant,
}

impl BearerHandler {
    /// Bearer handler backed by `source` for the given grant kind.
    pub fn new(source: Arc<dyn TokenSource>, grant: Grant) -> Self {
        Self { source, grant }
    }
}

#[async_trait]
impl SchemeHandler for BearerHandler {
    fn scheme(&self) -> &str {
        "bearer"
    }

    async fn respond(&self, _challenge: &AuthChallenge, _context: &ChallengeContext) -> Result<String> {
        let token = self.source.bearer_token(self.grant).await?;
        Ok(token.bearer_header())
    }
}

/// Answers a `token-service` challenge by forcing a fresh exchange at
/// the token endpoint.
pub struct TokenServiceHandler {
    source: Arc<dyn TokenSource>,
    grant: Grant,
}

impl TokenServiceHandler {
    /// Token-service handler backed by `source` for the given grant kind.
    pub fn new(source: Arc<dyn TokenSource>, grant: Grant) -> Self {
        Self { source, grant }
    }
}

#[async_trait]
impl SchemeHandler for TokenServiceHandler {
    fn scheme(&self) -> &str {
        "token-service"
    }

    async fn respond(&self, _challenge: &AuthChallenge, _context: &ChallengeContext) -> Result<String> {
        let token = self.source.refresh(self.grant).await?;
        Ok(token.bearer_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use quay_core::AccessToken;

    struct CountingSource {
        current: AtomicU32,
        refreshes: AtomicU32,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn bearer_token(&self, _grant: Grant) -> Result<AccessToken> {
            Ok(AccessToken::new(format!(
                "token-{}",
                self.current.load(Ordering::SeqCst)
            )))
        }

        async fn refresh(&self, _grant: Grant) -> Result<AccessToken> {
            let next = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            self.current.store(next, Ordering::SeqCst);
            Ok(AccessToken::new(format!("token-{}", next)))
        }
    }

    fn source() -> Arc<CountingSource> {
        Arc::new(CountingSource {
            current: AtomicU32::new(0),
            refreshes: AtomicU32::new(0),
        })
    }

    #[tokio::test]
    async fn bearer_uses_current_token() {
        let source = source();
        let handler = BearerHandler::new(source.clone(), Grant::Client);
        let challenge = AuthChallenge::new("Bearer");
        let context = ChallengeContext::new("GET", "/");
        let value = handler.respond(&challenge, &context).await.unwrap();
        assert_eq!(value, "Bearer token-0");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_service_forces_refresh() {
        let source = source();
        let handler = TokenServiceHandler::new(source.clone(), Grant::Client);
        let challenge = AuthChallenge::new("token-service");
        let context = ChallengeContext::new("GET", "/");
        let value = handler.respond(&challenge, &context).await.unwrap();
        assert_eq!(value, "Bearer token-1");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }
}
