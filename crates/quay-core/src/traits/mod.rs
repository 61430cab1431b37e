//! Trait seams between the core types and transport implementations.

mod scheme;
mod token_source;

pub use scheme::{ChallengeContext, SchemeHandler};
pub use token_source::TokenSource;
