//! Forward-proxy configuration.

use crate::credentials::ProxyCredentials;

/// Forward-proxy routing configuration for a session.
///
/// A session routes through the proxy only when the target host is not
/// covered by the ignored-hosts list. [`ProxyInfo::direct`] disables
/// proxying entirely.
#[derive(Debug, Clone, Default)]
pub struct ProxyInfo {
    target: Option<ProxyTarget>,
    credentials: Option<ProxyCredentials>,
    ignored_hosts: Vec<String>,
}

#[derive(Debug, Clone)]
struct ProxyTarget {
    host: String,
    port: u16,
}

impl ProxyInfo {
    /// No proxy: every request goes directly to the target host.
    pub fn direct() -> Self {
        Self::default()
    }

    /// Route through the given proxy host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            target: Some(ProxyTarget {
                host: host.into(),
                port,
            }),
            credentials: None,
            ignored_hosts: Vec::new(),
        }
    }

    /// Attach credentials for an authenticating proxy.
    pub fn with_credentials(mut self, credentials: ProxyCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Hosts that bypass the proxy. Entries are exact host names or
    /// `*.suffix` wildcards.
    pub fn with_ignored_hosts<S: Into<String>>(
        mut self,
        hosts: impl IntoIterator<Item = S>,
    ) -> Self {
        self.ignored_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true when a proxy is configured at all.
    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    /// Returns the configured proxy credentials, if any.
    pub fn credentials(&self) -> Option<&ProxyCredentials> {
        self.credentials.as_ref()
    }

    /// The proxy endpoint as an `http://host:port` URL, when configured.
    pub fn url(&self) -> Option<String> {
        self.target
            .as_ref()
            .map(|t| format!("http://{}:{}", t.host, t.port))
    }

    /// Whether requests to `host` should be routed through the proxy.
    ///
    /// False when no proxy is configured or when `host` matches an
    /// ignored-hosts entry.
    pub fn should_proxy(&self, host: &str) -> bool {
        if self.target.is_none() {
            return false;
        }
        !self.ignored_hosts.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                host.eq_ignore_ascii_case(suffix)
                    || host
                        .to_ascii_lowercase()
                        .ends_with(&format!(".{}", suffix.to_ascii_lowercase()))
            } else {
                host.eq_ignore_ascii_case(pattern)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_never_proxies() {
        let proxy = ProxyInfo::direct();
        assert!(!proxy.should_proxy("quay.example.com"));
        assert!(proxy.url().is_none());
    }

    #[test]
    fn configured_proxy_applies_by_default() {
        let proxy = ProxyInfo::new("proxy.corp", 3128);
        assert!(proxy.should_proxy("quay.example.com"));
        assert_eq!(proxy.url().as_deref(), Some("http://proxy.corp:3128"));
    }

    #[test]
    fn exact_ignored_host_bypasses() {
        let proxy = ProxyInfo::new("proxy.corp", 3128).with_ignored_hosts(["internal.corp"]);
        assert!(!proxy.should_proxy("internal.corp"));
        assert!(!proxy.should_proxy("INTERNAL.CORP"));
        assert!(proxy.should_proxy("external.example.com"));
    }

    #[test]
    fn wildcard_ignored_host_bypasses_subdomains() {
        let proxy = ProxyInfo::new("proxy.corp", 3128).with_ignored_hosts(["*.corp.example"]);
        assert!(!proxy.should_proxy("build.corp.example"));
        assert!(!proxy.should_proxy("corp.example"));
        assert!(proxy.should_proxy("corp.example.com"));
    }
}
