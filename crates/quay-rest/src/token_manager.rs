//! OAuth token management.
//!
//! A [`TokenManager`] obtains and refreshes bearer tokens for one remote
//! token endpoint. Client-grant tokens are cached for reuse across
//! requests; user-grant tokens are never cached and are re-derived from
//! the stored refresh token on every retrieval.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use quay_core::error::{AuthError, ConfigError};
use quay_core::{
    AccessToken, Grant, ProxyInfo, RefreshToken, Result, ServerUrl, TokenResponse, TokenSource,
};

use crate::transport::{self, TrustPolicy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Configuration for a token endpoint.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// The token endpoint URL.
    pub token_uri: ServerUrl,
    /// Stable client identifier, sent on every exchange.
    pub client_id: String,
    /// Optional client secret, sent when present.
    pub client_secret: Option<String>,
    /// Redirect URI for authorization-code exchanges.
    pub callback_url: Option<String>,
}

impl TokenConfig {
    /// Configuration for the given endpoint and client identifier.
    pub fn new(token_uri: ServerUrl, client_id: impl Into<String>) -> Self {
        Self {
            token_uri,
            client_id: client_id.into(),
            client_secret: None,
            callback_url: None,
        }
    }

    /// Attach a client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Attach the redirect URI used during the authorization-code flow.
    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

/// Manages bearer tokens for user and client grants.
///
/// Every exchange runs over a short-lived, unauthenticated transport
/// client honoring the manager's timeout, trust policy, and proxy
/// routing. Exchanges are serialized: one token-endpoint call in flight
/// per manager.
pub struct TokenManager {
    config: TokenConfig,
    timeout: Duration,
    trust: TrustPolicy,
    proxy: ProxyInfo,
    refresh_material: RwLock<Option<RefreshToken>>,
    client_token: RwLock<Option<AccessToken>>,
    exchange: tokio::sync::Mutex<()>,
}

impl TokenManager {
    /// A token manager with the default timeout, strict TLS validation,
    /// and no proxy.
    pub fn new(config: TokenConfig) -> Self {
        Self {
            config,
            timeout: DEFAULT_TIMEOUT,
            trust: TrustPolicy::default(),
            proxy: ProxyInfo::direct(),
            refresh_material: RwLock::new(None),
            client_token: RwLock::new(None),
            exchange: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the exchange timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the TLS trust policy for exchanges.
    pub fn with_trust_policy(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Route exchanges through a forward proxy.
    pub fn with_proxy(mut self, proxy: ProxyInfo) -> Self {
        self.proxy = proxy;
        self
    }

    /// Seed the refresh material for user-grant retrievals.
    pub fn with_refresh_token(self, token: RefreshToken) -> Self {
        *self.refresh_material.write().unwrap() = Some(token);
        self
    }

    /// Replace the stored refresh material.
    pub fn set_refresh_token(&self, token: RefreshToken) {
        *self.refresh_material.write().unwrap() = Some(token);
    }

    /// Obtain a token for `grant`.
    ///
    /// Client grants return the cached token when present, refreshing
    /// and caching otherwise. User grants always refresh: the access
    /// token is re-derived from the stored refresh token on every call.
    #[instrument(skip(self), fields(endpoint = %self.config.token_uri))]
    pub async fn get_token(&self, grant: Grant) -> Result<AccessToken> {
        match grant {
            Grant::User => self.refresh_user_token().await,
            Grant::Client => {
                if let Some(token) = self.client_token.read().unwrap().clone() {
                    debug!("returning cached client token");
                    return Ok(token);
                }
                self.refresh_client_token().await
            }
        }
    }

    /// Unconditionally perform a token-endpoint exchange for `grant`,
    /// replacing any cached token.
    #[instrument(skip(self), fields(endpoint = %self.config.token_uri))]
    pub async fn refresh_token(&self, grant: Grant) -> Result<AccessToken> {
        match grant {
            Grant::User => self.refresh_user_token().await,
            Grant::Client => self.refresh_client_token().await,
        }
    }

    /// One-shot exchange of an authorization code for a user token.
    ///
    /// Does not touch the cache; callers decide what to do with the
    /// returned refresh material.
    #[instrument(skip(self, code), fields(endpoint = %self.config.token_uri))]
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenResponse> {
        let callback_url = self
            .config
            .callback_url
            .clone()
            .ok_or(ConfigError::MissingCallbackUrl)?;

        let mut form = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("redirect_uri".to_string(), callback_url),
            ("client_id".to_string(), self.config.client_id.clone()),
            ("code".to_string(), code.to_string()),
        ];
        self.push_client_secret(&mut form);
        self.exchange_form(form).await
    }

    async fn refresh_user_token(&self) -> Result<AccessToken> {
        let refresh_token = self
            .refresh_material
            .read()
            .unwrap()
            .clone()
            .ok_or(AuthError::MissingRefreshToken)?;

        debug!("refreshing user token");
        let mut form = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            (
                "refresh_token".to_string(),
                refresh_token.as_str().to_string(),
            ),
            ("client_id".to_string(), self.config.client_id.clone()),
        ];
        self.push_client_secret(&mut form);
        let response = self.exchange_form(form).await?;

        // The endpoint may rotate the refresh token; keep the newest.
        if let Some(rotated) = response.refresh_token.as_deref() {
            *self.refresh_material.write().unwrap() = Some(RefreshToken::new(rotated));
        }
        Ok(AccessToken::new(response.access_token))
    }

    async fn refresh_client_token(&self) -> Result<AccessToken> {
        debug!("refreshing client token");
        let mut form = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("scope".to_string(), "read write".to_string()),
            ("client_id".to_string(), self.config.client_id.clone()),
        ];
        self.push_client_secret(&mut form);
        let response = self.exchange_form(form).await?;

        let token = AccessToken::new(response.access_token);
        *self.client_token.write().unwrap() = Some(token.clone());
        Ok(token)
    }

    fn push_client_secret(&self, form: &mut Vec<(String, String)>) {
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret".to_string(), secret.clone()));
        }
    }

    /// POST a url-encoded form to the token endpoint over a short-lived
    /// unauthenticated client and parse the JSON token body.
    async fn exchange_form(&self, form: Vec<(String, String)>) -> Result<TokenResponse> {
        let _serialized = self.exchange.lock().await;

        let host = self.config.token_uri.host().unwrap_or_default().to_string();
        let client = transport::build_client(&host, self.timeout, self.trust, &self.proxy)?;

        let response = client
            .post(self.config.token_uri.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange {
                reason: format!("token endpoint unreachable: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::TokenExchange {
                reason: format!("token endpoint returned {}", status),
            }
            .into());
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| {
                AuthError::TokenExchange {
                    reason: format!("malformed token body: {e}"),
                }
                .into()
            })
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_uri", &self.config.token_uri)
            .field("client_id", &self.config.client_id)
            .field("tokens", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenSource for TokenManager {
    async fn bearer_token(&self, grant: Grant) -> Result<AccessToken> {
        self.get_token(grant).await
    }

    async fn refresh(&self, grant: Grant) -> Result<AccessToken> {
        self.refresh_token(grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(TokenConfig::new(
            ServerUrl::new("https://auth.example.com/oauth/token").unwrap(),
            "quay-client",
        ))
    }

    #[tokio::test]
    async fn user_grant_without_refresh_material_fails() {
        let result = manager().get_token(Grant::User).await;
        assert!(matches!(
            result,
            Err(quay_core::Error::Auth(AuthError::MissingRefreshToken))
        ));
    }

    #[tokio::test]
    async fn authorization_code_requires_callback_url() {
        let result = manager().exchange_authorization_code("code-1").await;
        assert!(matches!(
            result,
            Err(quay_core::Error::Config(ConfigError::MissingCallbackUrl))
        ));
    }

    #[test]
    fn debug_redacts_tokens() {
        let manager = manager().with_refresh_token(RefreshToken::new("rt-secret"));
        let rendered = format!("{:?}", manager);
        assert!(rendered.contains("quay-client"));
        assert!(!rendered.contains("rt-secret"));
    }
}
