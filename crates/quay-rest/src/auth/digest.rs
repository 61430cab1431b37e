//! Digest scheme handler (RFC 2617 / RFC 7616).

use std::sync::Mutex;

use async_trait::async_trait;
use md5::{Digest as _, Md5};
use rand::RngCore;
use sha2::Sha256;

use quay_core::error::AuthError;
use quay_core::{AuthChallenge, ChallengeContext, Result, SchemeHandler};

/// Hash algorithm named by the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Sess,
    Sha256,
    Sha256Sess,
}

impl Algorithm {
    fn parse(name: Option<&str>) -> Option<Self> {
        match name.unwrap_or("MD5") {
            n if n.eq_ignore_ascii_case("MD5") => Some(Algorithm::Md5),
            n if n.eq_ignore_ascii_case("MD5-sess") => Some(Algorithm::Md5Sess),
            n if n.eq_ignore_ascii_case("SHA-256") => Some(Algorithm::Sha256),
            n if n.eq_ignore_ascii_case("SHA-256-sess") => Some(Algorithm::Sha256Sess),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Md5Sess => "MD5-sess",
            Algorithm::Sha256 => "SHA-256",
            Algorithm::Sha256Sess => "SHA-256-sess",
        }
    }

    fn is_session_variant(self) -> bool {
        matches!(self, Algorithm::Md5Sess | Algorithm::Sha256Sess)
    }

    fn hash(self, input: &str) -> String {
        match self {
            Algorithm::Md5 | Algorithm::Md5Sess => {
                hex::encode(Md5::digest(input.as_bytes()))
            }
            Algorithm::Sha256 | Algorithm::Sha256Sess => {
                hex::encode(Sha256::digest(input.as_bytes()))
            }
        }
    }
}

/// Computes a digest response from the challenge's nonce, realm, and
/// algorithm parameters using the shared credential.
///
/// The nonce count is tracked per handler so repeated challenges against
/// the same nonce produce increasing `nc` values.
pub struct DigestHandler {
    username: String,
    password: String,
    nonce_count: Mutex<u32>,
}

impl DigestHandler {
    /// Digest handler for the given credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            nonce_count: Mutex::new(0),
        }
    }

    fn next_nonce_count(&self) -> u32 {
        let mut count = self.nonce_count.lock().unwrap();
        *count += 1;
        *count
    }
}

#[async_trait]
impl SchemeHandler for DigestHandler {
    fn scheme(&self) -> &str {
        "digest"
    }

    async fn respond(&self, challenge: &AuthChallenge, context: &ChallengeContext) -> Result<String> {
        let realm = require_param(challenge, "realm")?;
        let nonce = require_param(challenge, "nonce")?;
        let algorithm =
            Algorithm::parse(challenge.param("algorithm")).ok_or_else(|| {
                AuthError::ChallengeInvalid {
                    scheme: challenge.scheme.clone(),
                    reason: format!(
                        "unsupported algorithm '{}'",
                        challenge.param("algorithm").unwrap_or_default()
                    ),
                }
            })?;

        // The server's qop list may offer several values; only `auth` is
        // supported here.
        let qop = challenge
            .param("qop")
            .filter(|list| list.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")))
            .map(|_| "auth");

        let cnonce = random_cnonce();
        let nc = self.next_nonce_count();

        let response = digest_response(
            algorithm,
            &self.username,
            &self.password,
            realm,
            nonce,
            nc,
            &cnonce,
            qop,
            &context.method,
            &context.uri,
        );

        let mut header = format!(
            r#"Digest username="{}", realm="{}", nonce="{}", uri="{}", response="{}", algorithm={}"#,
            self.username,
            realm,
            nonce,
            context.uri,
            response,
            algorithm.label(),
        );
        if qop.is_some() {
            header.push_str(&format!(r#", qop=auth, nc={:08x}, cnonce="{}""#, nc, cnonce));
        }
        if let Some(opaque) = challenge.param("opaque") {
            header.push_str(&format!(r#", opaque="{}""#, opaque));
        }
        Ok(header)
    }
}

fn require_param<'a>(challenge: &'a AuthChallenge, name: &str) -> Result<&'a str> {
    challenge.param(name).ok_or_else(|| {
        AuthError::ChallengeInvalid {
            scheme: challenge.scheme.clone(),
            reason: format!("missing '{}' parameter", name),
        }
        .into()
    })
}

fn random_cnonce() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compute the digest `response` parameter.
#[allow(clippy::too_many_arguments)]
fn digest_response(
    algorithm: Algorithm,
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    nc: u32,
    cnonce: &str,
    qop: Option<&str>,
    method: &str,
    uri: &str,
) -> String {
    let mut ha1 = algorithm.hash(&format!("{}:{}:{}", username, realm, password));
    if algorithm.is_session_variant() {
        ha1 = algorithm.hash(&format!("{}:{}:{}", ha1, nonce, cnonce));
    }
    let ha2 = algorithm.hash(&format!("{}:{}", method, uri));

    match qop {
        Some(qop) => algorithm.hash(&format!(
            "{}:{}:{:08x}:{}:{}:{}",
            ha1, nonce, nc, cnonce, qop, ha2
        )),
        None => algorithm.hash(&format!("{}:{}:{}", ha1, nonce, ha2)),
    }
}
