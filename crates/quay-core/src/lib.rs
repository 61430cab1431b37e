//! quay-core - Core types and traits for the quay REST client toolkit.

pub mod challenge;
pub mod credentials;
pub mod error;
pub mod page;
pub mod proxy;
pub mod time;
pub mod tokens;
pub mod traits;
pub mod types;

pub use challenge::AuthChallenge;
pub use credentials::{Credential, Grant, ProxyCredentials};
pub use error::Error;
pub use page::{DEFAULT_COLLECTION_LIMIT, Page, PageRequest};
pub use proxy::ProxyInfo;
pub use tokens::{AccessToken, RefreshToken, TokenResponse};
pub use traits::{ChallengeContext, SchemeHandler, TokenSource};
pub use types::ServerUrl;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
