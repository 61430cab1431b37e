//! Bearer token source trait.

use async_trait::async_trait;

use crate::credentials::Grant;
use crate::tokens::AccessToken;
use crate::Result;

/// The capability to produce a current bearer token for an access grant.
///
/// OAuth support implements this behind the scenes; the session only
/// depends on this seam, never on how tokens are obtained or cached.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a token valid for `grant`, refreshing if necessary.
    async fn bearer_token(&self, grant: Grant) -> Result<AccessToken>;

    /// Force a fresh token exchange for `grant`, replacing any cache.
    async fn refresh(&self, grant: Grant) -> Result<AccessToken>;
}
