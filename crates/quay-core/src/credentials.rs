//! Credential material for session authentication.

use std::fmt;

/// The authorization basis for an OAuth token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grant {
    /// Delegated access on behalf of a user, refresh-token based.
    User,
    /// Service-to-service access, client-credentials based.
    Client,
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::User => write!(f, "user"),
            Grant::Client => write!(f, "client"),
        }
    }
}

/// Opaque secret material used to authenticate a session.
///
/// Immutable once constructed, and held only by the component that
/// authenticates with it. The `Debug` representation redacts all secret
/// fields.
#[derive(Clone)]
pub enum Credential {
    /// Username/password pair for the form-login handshake.
    UsernamePassword { username: String, password: String },
    /// A long-lived API token exchanged for a bearer credential.
    ApiToken { token: String },
    /// An OAuth grant; bearer tokens are sourced per request.
    OAuthGrant { grant: Grant },
}

impl Credential {
    /// Username/password credential.
    pub fn username_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::UsernamePassword {
            username: username.into(),
            password: password.into(),
        }
    }

    /// API-token credential.
    pub fn api_token(token: impl Into<String>) -> Self {
        Credential::ApiToken {
            token: token.into(),
        }
    }

    /// OAuth credential for the given grant kind.
    pub fn oauth(grant: Grant) -> Self {
        Credential::OAuthGrant { grant }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Credential::ApiToken { .. } => f
                .debug_struct("ApiToken")
                .field("token", &"[REDACTED]")
                .finish(),
            Credential::OAuthGrant { grant } => f
                .debug_struct("OAuthGrant")
                .field("grant", grant)
                .finish(),
        }
    }
}

/// Credentials for answering proxy or direct authentication challenges.
///
/// The NTLM fields are only meaningful alongside a username/password and
/// may be left empty for basic or digest authentication.
#[derive(Clone, Default)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
    pub ntlm_domain: Option<String>,
    pub ntlm_workstation: Option<String>,
}

impl ProxyCredentials {
    /// Username/password proxy credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ntlm_domain: None,
            ntlm_workstation: None,
        }
    }

    /// Attach an NTLM domain and workstation.
    pub fn with_ntlm(
        mut self,
        domain: impl Into<String>,
        workstation: impl Into<String>,
    ) -> Self {
        self.ntlm_domain = Some(domain.into());
        self.ntlm_workstation = Some(workstation.into());
        self
    }
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("ntlm_domain", &self.ntlm_domain)
            .field("ntlm_workstation", &self.ntlm_workstation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let credential = Credential::username_password("sysadmin", "hunter2");
        let rendered = format!("{:?}", credential);
        assert!(rendered.contains("sysadmin"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn debug_redacts_api_token() {
        let credential = Credential::api_token("tok-abc123");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains("tok-abc123"));
    }

    #[test]
    fn debug_redacts_proxy_password() {
        let creds = ProxyCredentials::new("proxyuser", "secret").with_ntlm("CORP", "BUILD01");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("proxyuser"));
        assert!(rendered.contains("CORP"));
        assert!(!rendered.contains("secret"));
    }
}
