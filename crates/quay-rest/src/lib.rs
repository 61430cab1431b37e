//! quay-rest - reqwest-backed authenticated session implementation.

mod auth;
mod paged;
mod request;
mod session;
mod token_manager;
mod transport;

pub use auth::{
    AUTHORIZATION, BasicHandler, BearerHandler, ChallengeAuthenticator, DigestHandler,
    HandshakeState, NtlmHandler, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TokenServiceHandler,
    WWW_AUTHENTICATE,
};
pub use paged::PagedFetcher;
pub use request::{ApiRequest, ApiResponse, RequestBody};
pub use session::{RestSession, SessionBuilder, SessionState, X_CSRF_TOKEN};
pub use token_manager::{TokenConfig, TokenManager};
pub use transport::TrustPolicy;
