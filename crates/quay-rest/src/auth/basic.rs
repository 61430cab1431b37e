//! Basic scheme handler.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use quay_core::{AuthChallenge, ChallengeContext, Result, SchemeHandler};

/// Computes a base64 `user:password` credential header.
pub struct BasicHandler {
    username: String,
    password: String,
}

impl BasicHandler {
    /// Basic handler for the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl SchemeHandler for BasicHandler {
    fn scheme(&self) -> &str {
        "basic"
    }

    async fn respond(&self, _challenge: &AuthChallenge, _context: &ChallengeContext) -> Result<String> {
        let credential = STANDARD.encode(format!("{}:{}", self.username, self.password));
        Ok(format!("Basic {}", credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn encodes_user_and_password() {
        let handler = BasicHandler::new("a", "b");
        let challenge = AuthChallenge::new("Basic");
        let context = ChallengeContext::new("GET", "/");
        let value = handler.respond(&challenge, &context).await.unwrap();
        assert_eq!(value, "Basic YTpi");
    }

    #[tokio::test]
    async fn encodes_empty_password() {
        let handler = BasicHandler::new("user", "");
        let challenge = AuthChallenge::new("Basic");
        let context = ChallengeContext::new("GET", "/");
        let value = handler.respond(&challenge, &context).await.unwrap();
        assert_eq!(value, "Basic dXNlcjo=");
    }
}
