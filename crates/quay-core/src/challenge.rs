//! Authentication challenge parsing.
//!
//! Challenges arrive on `WWW-Authenticate` / `Proxy-Authenticate` headers.
//! A single header value may carry one scheme or several, each with
//! `k=v` parameters, a bare token68 blob, or nothing at all:
//!
//! ```text
//! WWW-Authenticate: Digest realm="quay", nonce="abc", qop="auth"
//! WWW-Authenticate: NTLM
//! WWW-Authenticate: NTLM TlRMTVNTUAACAAAA...
//! WWW-Authenticate: Basic realm="a", Bearer realm="b"
//! ```

use std::fmt;

/// One authentication challenge: a scheme name plus its parameters.
///
/// Challenges are ordered as received; scheme matching is always
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// Scheme name as received (case preserved).
    pub scheme: String,
    /// `k=v` parameters in header order, quotes stripped.
    pub params: Vec<(String, String)>,
    /// Opaque token68 payload, for schemes like NTLM that send one.
    pub token68: Option<String>,
}

impl AuthChallenge {
    /// A bare challenge with no parameters.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            params: Vec::new(),
            token68: None,
        }
    }

    /// Returns true if this challenge's scheme matches `name`,
    /// case-insensitively.
    pub fn matches_scheme(&self, name: &str) -> bool {
        self.scheme.eq_ignore_ascii_case(name)
    }

    /// Case-insensitive parameter lookup.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the opaque token68 payload, if present.
    pub fn token68(&self) -> Option<&str> {
        self.token68.as_deref()
    }

    /// Parse every challenge from a set of header values, preserving
    /// header order.
    pub fn parse_headers<S: AsRef<str>>(values: &[S]) -> Vec<AuthChallenge> {
        let mut challenges = Vec::new();
        for value in values {
            parse_header_value(value.as_ref(), &mut challenges);
        }
        challenges
    }
}

impl fmt::Display for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme)?;
        if let Some(ref token) = self.token68 {
            write!(f, " {}", token)?;
        }
        for (i, (k, v)) in self.params.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}=\"{}\"", sep, k, v)?;
        }
        Ok(())
    }
}

/// Parse one header value, appending parsed challenges.
fn parse_header_value(value: &str, challenges: &mut Vec<AuthChallenge>) {
    for part in split_unquoted_commas(value) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        match part.split_once(char::is_whitespace) {
            Some((scheme, rest)) => {
                let rest = rest.trim();
                let mut challenge = AuthChallenge::new(scheme);
                if let Some((key, raw)) = split_param(rest) {
                    challenge.params.push((key, raw));
                } else {
                    challenge.token68 = Some(rest.to_string());
                }
                challenges.push(challenge);
            }
            None => {
                if let Some((key, raw)) = split_param(part) {
                    // Continuation parameter for the current challenge
                    if let Some(current) = challenges.last_mut() {
                        current.params.push((key, raw));
                    }
                } else {
                    challenges.push(AuthChallenge::new(part));
                }
            }
        }
    }
}

/// Split `k=v` / `k="v"` into (key, unquoted value). Returns `None` for
/// anything that is not a parameter: bare schemes and token68 blobs
/// (whose only `=` characters are trailing padding).
fn split_param(s: &str) -> Option<(String, String)> {
    let idx = s.find('=')?;
    let key = s[..idx].trim();
    let value = s[idx + 1..].trim();
    // token68 padding: trailing `=` characters with no value after them
    if key.is_empty()
        || value.is_empty()
        || value.chars().all(|c| c == '=')
        || key.contains(char::is_whitespace)
    {
        return None;
    }
    let value = value.trim_matches('"');
    Some((key.to_string(), value.to_string()))
}

/// Split on commas that are not inside a quoted string.
fn split_unquoted_commas(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_digest_challenge_with_params() {
        let challenges = AuthChallenge::parse_headers(&[
            r#"Digest realm="quay", nonce="dcd98b7102dd2f0e", qop="auth", algorithm=MD5"#,
        ]);
        assert_eq!(challenges.len(), 1);
        let digest = &challenges[0];
        assert!(digest.matches_scheme("digest"));
        assert_eq!(digest.param("realm"), Some("quay"));
        assert_eq!(digest.param("nonce"), Some("dcd98b7102dd2f0e"));
        assert_eq!(digest.param("ALGORITHM"), Some("MD5"));
    }

    #[test]
    fn parses_bare_scheme() {
        let challenges = AuthChallenge::parse_headers(&["NTLM"]);
        assert_eq!(challenges.len(), 1);
        assert!(challenges[0].matches_scheme("ntlm"));
        assert!(challenges[0].token68().is_none());
        assert!(challenges[0].params.is_empty());
    }

    #[test]
    fn parses_token68_payload() {
        let challenges = AuthChallenge::parse_headers(&["NTLM TlRMTVNTUAACAAAABgAGADg="]);
        assert_eq!(challenges.len(), 1);
        assert_eq!(
            challenges[0].token68(),
            Some("TlRMTVNTUAACAAAABgAGADg=")
        );
    }

    #[test]
    fn parses_multiple_challenges_in_one_value() {
        let challenges =
            AuthChallenge::parse_headers(&[r#"Basic realm="one", Bearer realm="two""#]);
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].matches_scheme("Basic"));
        assert_eq!(challenges[0].param("realm"), Some("one"));
        assert!(challenges[1].matches_scheme("bearer"));
        assert_eq!(challenges[1].param("realm"), Some("two"));
    }

    #[test]
    fn preserves_header_order_across_values() {
        let challenges =
            AuthChallenge::parse_headers(&["Negotiate", r#"Basic realm="fallback""#]);
        assert_eq!(challenges.len(), 2);
        assert!(challenges[0].matches_scheme("negotiate"));
        assert!(challenges[1].matches_scheme("basic"));
    }

    #[test]
    fn quoted_commas_do_not_split() {
        let challenges =
            AuthChallenge::parse_headers(&[r#"Digest realm="a, with comma", nonce="n""#]);
        assert_eq!(challenges.len(), 1);
        assert_eq!(challenges[0].param("realm"), Some("a, with comma"));
        assert_eq!(challenges[0].param("nonce"), Some("n"));
    }

    #[test]
    fn display_round_trips_scheme_and_params() {
        let challenges = AuthChallenge::parse_headers(&[r#"Basic realm="quay""#]);
        let rendered = challenges[0].to_string();
        assert!(rendered.starts_with("Basic"));
        assert!(rendered.contains("realm=\"quay\""));
    }
}
