//! Access and refresh token types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A bearer access token.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the token as an `Authorization` header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

/// Opaque refresh material for a user grant.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Wrap a raw refresh token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw refresh token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefreshToken([REDACTED])")
    }
}

/// Wire representation of a token-endpoint response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The new access token.
    pub access_token: String,

    /// Token type reported by the endpoint, usually `bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Seconds until the access token expires, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Replacement refresh token, when the endpoint rotates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted scope, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-value");
        assert_eq!(format!("{:?}", token), "AccessToken([REDACTED])");
    }

    #[test]
    fn bearer_header_format() {
        let token = AccessToken::new("abc");
        assert_eq!(token.bearer_header(), "Bearer abc");
    }

    #[test]
    fn token_response_deserializes_minimal_body() {
        let json = r#"{"access_token":"at_1"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_1");
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn token_response_deserializes_full_body() {
        let json = r#"{
            "access_token": "at_1",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt_1",
            "scope": "read write"
        }"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("rt_1"));
        assert_eq!(token.expires_in, Some(3600));
    }
}
