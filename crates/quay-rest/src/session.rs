//! Authenticated connection session.
//!
//! A [`RestSession`] owns the transport client, performs the initial
//! authentication handshake for its credential, attaches session-scoped
//! headers (CSRF token, bearer token) to every request, and drives
//! bounded re-authentication when the server reports an expired session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use quay_core::error::{AuthError, ConfigError, RequestFailure, TransportError};
use quay_core::{
    AuthChallenge, ChallengeContext, Credential, Error, ProxyCredentials, ProxyInfo, Result,
    ServerUrl, TokenSource,
};

use crate::auth::{self, ChallengeAuthenticator};
use crate::request::{ApiRequest, ApiResponse, RequestBody};
use crate::transport::{self, TrustPolicy};

/// Response header carrying the session's anti-forgery token.
pub const X_CSRF_TOKEN: &str = "X-CSRF-TOKEN";

/// Login path for the form-credentials handshake.
const LOGIN_PATH: &str = "/j_spring_security_check";

/// Authenticate path for the API-token handshake.
const TOKEN_AUTHENTICATE_PATH: &str = "/api/tokens/authenticate";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_CEILING: u32 = 2;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport client exists yet.
    Unconnected,
    /// The initial handshake is in flight.
    Connecting,
    /// The handshake succeeded; requests are flowing.
    Authenticated,
    /// A re-authentication handshake is in flight.
    Reauthenticating,
    /// The handshake failed or the retry ceiling was exceeded.
    Failed,
}

/// Session-scoped headers attached to every request.
#[derive(Debug, Clone, Default)]
struct CommonHeaders {
    csrf: Option<String>,
    bearer: Option<String>,
}

/// Response body of the API-token authenticate endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BearerTokenResponse {
    bearer_token: String,
}

/// An authenticated session against one server.
///
/// Cloning is cheap; clones share the same transport, headers, and
/// re-authentication state.
#[derive(Clone)]
pub struct RestSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    base: ServerUrl,
    credential: Credential,
    timeout: Duration,
    trust: TrustPolicy,
    proxy: ProxyInfo,
    unauthorized_statuses: Vec<u16>,
    retry_ceiling: u32,
    token_source: Option<Arc<dyn TokenSource>>,
    challenge_auth: Option<ChallengeAuthenticator>,
    client: RwLock<Option<reqwest::Client>>,
    headers: RwLock<CommonHeaders>,
    state: RwLock<SessionState>,
    /// Bumped on every successful handshake; lets concurrent 401s detect
    /// that another task already re-authenticated.
    auth_epoch: AtomicU64,
    /// Serializes the handshake: exactly one authentication attempt may
    /// be in flight per session.
    handshake: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl RestSession {
    /// Start building a session.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// The session's base URL.
    pub fn base_url(&self) -> &ServerUrl {
        &self.inner.base
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.read().unwrap()
    }

    /// Snapshot of the stored CSRF token, if the handshake produced one.
    pub fn csrf_token(&self) -> Option<String> {
        self.inner.headers.read().unwrap().csrf.clone()
    }

    /// Snapshot of the stored bearer header, if the handshake produced
    /// one.
    pub fn bearer_header(&self) -> Option<String> {
        self.inner.headers.read().unwrap().bearer.clone()
    }

    /// Cancel all in-flight and future requests on this session.
    ///
    /// An in-flight `execute` (including its re-authentication chain)
    /// surfaces [`Error::Cancelled`]; stored CSRF/bearer state is left
    /// untouched.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Perform the authentication handshake for the configured
    /// credential, building a fresh transport client first.
    ///
    /// Safe to call again after a failure; concurrent callers are
    /// serialized.
    #[instrument(skip(self), fields(base = %self.inner.base))]
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.acquire_handshake().await?;
        self.connect_locked().await
    }

    /// Execute a request, attaching session headers and re-authenticating
    /// on an unauthorized response, bounded by the retry ceiling.
    ///
    /// Calling `execute` on an unconnected session triggers an implicit
    /// [`connect`](Self::connect) first.
    #[instrument(skip(self, request), fields(method = %request.method(), base = %self.inner.base))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut attempts: u32 = 0;
        let mut challenge_header: Option<(&'static str, String)> = None;

        loop {
            if self.inner.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            self.ensure_connected().await?;

            let epoch = self.inner.auth_epoch.load(Ordering::Acquire);
            let response = self.transmit(request, challenge_header.as_ref()).await?;
            let status = response.status().as_u16();
            if response.status().is_success() {
                trace!(status, "request succeeded");
                return Ok(ApiResponse::new(response));
            }

            let url = response.url().clone();
            let reason = response.status().canonical_reason().map(str::to_string);

            // Proxy challenges are answered by the challenge
            // authenticator; a plain unauthorized status re-runs the
            // credential handshake.
            if status == 407 && attempts < self.inner.retry_ceiling {
                if let Some(authenticator) = &self.inner.challenge_auth {
                    let values: Vec<String> = response
                        .headers()
                        .get_all(auth::PROXY_AUTHENTICATE)
                        .iter()
                        .filter_map(|v| v.to_str().ok())
                        .map(str::to_string)
                        .collect();
                    let challenges = AuthChallenge::parse_headers(&values);
                    let mut uri = url.path().to_string();
                    if let Some(query) = url.query() {
                        uri.push('?');
                        uri.push_str(query);
                    }
                    let context = ChallengeContext::new(request.method().as_str(), uri);
                    // UnsupportedScheme propagates from here and is
                    // never retried.
                    let value = authenticator.authenticate(&challenges, &context).await?;
                    challenge_header =
                        Some((ChallengeAuthenticator::response_header(true), value));
                    attempts += 1;
                    debug!(attempts, "answering proxy challenge");
                    continue;
                }
            }

            if self.inner.unauthorized_statuses.contains(&status)
                && attempts < self.inner.retry_ceiling
            {
                debug!(status, attempts, "unauthorized response, re-authenticating");
                self.reauthenticate(epoch).await?;
                attempts += 1;
                continue;
            }

            return Err(RequestFailure::new(
                status,
                reason,
                request.method().as_str(),
                url.as_str(),
            )
            .into());
        }
    }

    /// Connect only if no transport client exists yet. Concurrent first
    /// requests share one handshake.
    async fn ensure_connected(&self) -> Result<()> {
        if self.inner.client.read().unwrap().is_some() {
            return Ok(());
        }
        let _guard = self.acquire_handshake().await?;
        if self.inner.client.read().unwrap().is_some() {
            return Ok(());
        }
        self.connect_locked().await
    }

    /// Re-run the handshake unless another task already did while this
    /// one waited for the lock.
    async fn reauthenticate(&self, seen_epoch: u64) -> Result<()> {
        let _guard = self.acquire_handshake().await?;
        if self.inner.auth_epoch.load(Ordering::Acquire) != seen_epoch {
            debug!("another task already re-authenticated");
            return Ok(());
        }
        self.connect_locked().await
    }

    async fn acquire_handshake(&self) -> Result<tokio::sync::MutexGuard<'_, ()>> {
        tokio::select! {
            _ = self.inner.cancel.cancelled() => Err(Error::Cancelled),
            guard = self.inner.handshake.lock() => Ok(guard),
        }
    }

    /// The handshake body. Caller must hold the handshake lock.
    async fn connect_locked(&self) -> Result<()> {
        let previous = self.state();
        self.set_state(if previous == SessionState::Authenticated {
            SessionState::Reauthenticating
        } else {
            SessionState::Connecting
        });

        let result = self.handshake_once().await;
        match result {
            Ok((client, headers)) => {
                *self.inner.client.write().unwrap() = Some(client);
                *self.inner.headers.write().unwrap() = headers;
                self.inner.auth_epoch.fetch_add(1, Ordering::AcqRel);
                self.set_state(SessionState::Authenticated);
                info!("session authenticated");
                Ok(())
            }
            Err(Error::Cancelled) => {
                // Abort without mutating anything; the session stays
                // where it was.
                self.set_state(previous);
                Err(Error::Cancelled)
            }
            Err(e) => {
                self.set_state(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn handshake_once(&self) -> Result<(reqwest::Client, CommonHeaders)> {
        let host = self.inner.base.host().unwrap_or_default().to_string();
        let client = transport::build_client(
            &host,
            self.inner.timeout,
            self.inner.trust,
            &self.inner.proxy,
        )?;

        let headers = match &self.inner.credential {
            Credential::UsernamePassword { username, password } => {
                self.login_with_credentials(&client, username, password)
                    .await?
            }
            Credential::ApiToken { token } => {
                self.authenticate_api_token(&client, token).await?
            }
            Credential::OAuthGrant { grant } => {
                // Tokens expire independently of the connection, so the
                // handshake only validates that an exchange works; the
                // bearer is re-sourced on every request.
                let source = self
                    .inner
                    .token_source
                    .as_ref()
                    .ok_or(ConfigError::MissingTokenSource)?;
                self.guarded(source.refresh(*grant)).await?;
                CommonHeaders::default()
            }
        };
        Ok((client, headers))
    }

    #[instrument(skip_all)]
    async fn login_with_credentials(
        &self,
        client: &reqwest::Client,
        username: &str,
        password: &str,
    ) -> Result<CommonHeaders> {
        let url = self.inner.base.join(LOGIN_PATH)?;
        debug!("posting login form");
        let form = [("j_username", username), ("j_password", password)];
        let response = self
            .guarded(async {
                client
                    .post(url)
                    .form(&form)
                    .send()
                    .await
                    .map_err(transport::map_error)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::HandshakeFailed {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }
            .into());
        }

        let csrf = header_value(&response, X_CSRF_TOKEN);
        if csrf.is_none() {
            warn!("no CSRF token found when authenticating");
        }
        Ok(CommonHeaders { csrf, bearer: None })
    }

    #[instrument(skip_all)]
    async fn authenticate_api_token(
        &self,
        client: &reqwest::Client,
        token: &str,
    ) -> Result<CommonHeaders> {
        let url = self.inner.base.join(TOKEN_AUTHENTICATE_PATH)?;
        debug!("exchanging API token for bearer credential");
        let response = self
            .guarded(async {
                client
                    .post(url)
                    .header(auth::AUTHORIZATION, format!("token {}", token))
                    .send()
                    .await
                    .map_err(transport::map_error)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::HandshakeFailed {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }
            .into());
        }

        let csrf = header_value(&response, X_CSRF_TOKEN);
        if csrf.is_none() {
            warn!("no CSRF token found when authenticating");
        }
        let body: BearerTokenResponse =
            self.guarded(async {
                response
                    .json()
                    .await
                    .map_err(|e| {
                        AuthError::MalformedTokenBody {
                            reason: e.to_string(),
                        }
                        .into()
                    })
            })
            .await?;
        Ok(CommonHeaders {
            csrf,
            bearer: Some(format!("Bearer {}", body.bearer_token)),
        })
    }

    /// Build and send one transport request: session headers, then an
    /// OAuth bearer when applicable, then request-scoped headers.
    async fn transmit(
        &self,
        request: &ApiRequest,
        challenge_header: Option<&(&'static str, String)>,
    ) -> Result<reqwest::Response> {
        let client = self.inner.client.read().unwrap().clone().ok_or_else(|| {
            Error::Transport(TransportError::Connection {
                message: "no transport client; session not connected".to_string(),
            })
        })?;
        let url = request.resolve(&self.inner.base)?;
        trace!(%url, "transmitting request");

        let mut builder = client.request(request.method().clone(), url);
        {
            let headers = self.inner.headers.read().unwrap();
            if let Some(csrf) = &headers.csrf {
                builder = builder.header(X_CSRF_TOKEN, csrf);
            }
            if let Some(bearer) = &headers.bearer {
                builder = builder.header(auth::AUTHORIZATION, bearer);
            }
        }
        if let Credential::OAuthGrant { grant } = &self.inner.credential {
            let source = self
                .inner
                .token_source
                .as_ref()
                .ok_or(ConfigError::MissingTokenSource)?;
            let token = self.guarded(source.bearer_token(*grant)).await?;
            builder = builder.header(auth::AUTHORIZATION, token.bearer_header());
        }
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some((name, value)) = challenge_header {
            builder = builder.header(*name, value);
        }
        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        self.guarded(async { builder.send().await.map_err(transport::map_error) })
            .await
    }

    /// Run a future unless the session is cancelled first.
    async fn guarded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            _ = self.inner.cancel.cancelled() => Err(Error::Cancelled),
            result = fut => result,
        }
    }

    fn set_state(&self, state: SessionState) {
        *self.inner.state.write().unwrap() = state;
    }
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestSession")
            .field("base", &self.inner.base)
            .field("state", &self.state())
            .field("headers", &"[REDACTED]")
            .finish()
    }
}

fn header_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Builder for [`RestSession`].
///
/// Validation happens at [`build`](Self::build): the base URL and
/// credential are required, the timeout must be non-zero, proxy host and
/// port must be given together, and an OAuth credential requires a token
/// source.
#[derive(Default)]
pub struct SessionBuilder {
    base: Option<ServerUrl>,
    credential: Option<Credential>,
    timeout: Option<Duration>,
    trust: TrustPolicy,
    proxy_host: Option<String>,
    proxy_port: Option<u16>,
    proxy_credentials: Option<ProxyCredentials>,
    proxy_ignored_hosts: Vec<String>,
    unauthorized_statuses: Vec<u16>,
    retry_ceiling: Option<u32>,
    token_source: Option<Arc<dyn TokenSource>>,
    challenge_auth: Option<ChallengeAuthenticator>,
}

impl SessionBuilder {
    /// An empty builder with the defaults: 120 s timeout, strict TLS
    /// validation, no proxy, unauthorized status 401, retry ceiling 2.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server base URL (required).
    pub fn base_url(mut self, base: ServerUrl) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the credential to authenticate with (required).
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Uniform connect/read/overall timeout for the session.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// TLS trust policy. `TrustAll` is an explicit opt-in, never a
    /// default.
    pub fn trust_policy(mut self, trust: TrustPolicy) -> Self {
        self.trust = trust;
        self
    }

    /// Forward-proxy host.
    pub fn proxy_host(mut self, host: impl Into<String>) -> Self {
        self.proxy_host = Some(host.into());
        self
    }

    /// Forward-proxy port.
    pub fn proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = Some(port);
        self
    }

    /// Credentials for an authenticating proxy. Also seeds the default
    /// challenge authenticator when none was provided explicitly.
    pub fn proxy_credentials(mut self, credentials: ProxyCredentials) -> Self {
        self.proxy_credentials = Some(credentials);
        self
    }

    /// Hosts that bypass the proxy (exact names or `*.suffix` wildcards).
    pub fn proxy_ignored_hosts<S: Into<String>>(
        mut self,
        hosts: impl IntoIterator<Item = S>,
    ) -> Self {
        self.proxy_ignored_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the set of statuses that trigger re-authentication
    /// (default: 401 only).
    pub fn unauthorized_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.unauthorized_statuses = statuses.into_iter().collect();
        self
    }

    /// Replace the re-authentication retry ceiling (default: 2).
    pub fn retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = Some(ceiling);
        self
    }

    /// Token source for OAuth credentials.
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Explicit challenge authenticator for proxy challenges.
    pub fn challenge_authenticator(mut self, authenticator: ChallengeAuthenticator) -> Self {
        self.challenge_auth = Some(authenticator);
        self
    }

    /// Validate the configuration and create the session.
    pub fn build(self) -> Result<RestSession> {
        let base = self.base.ok_or(ConfigError::MissingBaseUrl)?;
        let credential = self.credential.ok_or(ConfigError::MissingCredential)?;

        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout {
                seconds: timeout.as_secs(),
            }
            .into());
        }

        let proxy = match (self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) => {
                let mut proxy = ProxyInfo::new(host, port)
                    .with_ignored_hosts(self.proxy_ignored_hosts);
                if let Some(credentials) = self.proxy_credentials.clone() {
                    proxy = proxy.with_credentials(credentials);
                }
                proxy
            }
            (Some(_), None) => return Err(ConfigError::MissingProxyPort.into()),
            (None, Some(_)) => return Err(ConfigError::MissingProxyHost.into()),
            (None, None) => ProxyInfo::direct(),
        };

        if matches!(credential, Credential::OAuthGrant { .. }) && self.token_source.is_none() {
            return Err(ConfigError::MissingTokenSource.into());
        }

        let challenge_auth = self.challenge_auth.or_else(|| {
            self.proxy_credentials
                .map(ChallengeAuthenticator::new)
        });

        Ok(RestSession {
            inner: Arc::new(SessionInner {
                base,
                credential,
                timeout,
                trust: self.trust,
                proxy,
                unauthorized_statuses: if self.unauthorized_statuses.is_empty() {
                    vec![401]
                } else {
                    self.unauthorized_statuses
                },
                retry_ceiling: self.retry_ceiling.unwrap_or(DEFAULT_RETRY_CEILING),
                token_source: self.token_source,
                challenge_auth,
                client: RwLock::new(None),
                headers: RwLock::new(CommonHeaders::default()),
                state: RwLock::new(SessionState::Unconnected),
                auth_epoch: AtomicU64::new(0),
                handshake: tokio::sync::Mutex::new(()),
                cancel: CancellationToken::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerUrl {
        ServerUrl::new("https://quay.example.com").unwrap()
    }

    #[test]
    fn build_requires_base_url() {
        let result = RestSession::builder()
            .credential(Credential::api_token("t"))
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingBaseUrl))
        ));
    }

    #[test]
    fn build_requires_credential() {
        let result = RestSession::builder().base_url(base()).build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingCredential))
        ));
    }

    #[test]
    fn build_rejects_zero_timeout() {
        let result = RestSession::builder()
            .base_url(base())
            .credential(Credential::api_token("t"))
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidTimeout { .. }))
        ));
    }

    #[test]
    fn build_rejects_partial_proxy() {
        let result = RestSession::builder()
            .base_url(base())
            .credential(Credential::api_token("t"))
            .proxy_host("proxy.corp")
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingProxyPort))
        ));

        let result = RestSession::builder()
            .base_url(base())
            .credential(Credential::api_token("t"))
            .proxy_port(3128)
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingProxyHost))
        ));
    }

    #[test]
    fn build_rejects_oauth_without_token_source() {
        let result = RestSession::builder()
            .base_url(base())
            .credential(Credential::oauth(quay_core::Grant::Client))
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingTokenSource))
        ));
    }

    #[test]
    fn new_session_is_unconnected() {
        let session = RestSession::builder()
            .base_url(base())
            .credential(Credential::api_token("t"))
            .build()
            .unwrap();
        assert_eq!(session.state(), SessionState::Unconnected);
        assert!(session.csrf_token().is_none());
        assert!(session.bearer_header().is_none());
    }

    #[test]
    fn debug_redacts_headers() {
        let session = RestSession::builder()
            .base_url(base())
            .credential(Credential::username_password("u", "p"))
            .build()
            .unwrap();
        let rendered = format!("{:?}", session);
        assert!(rendered.contains("quay.example.com"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
