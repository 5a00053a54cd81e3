//! Authentication subsystem.
//!
//! Verifies bearer tokens against the upstream forge's commit endpoint, with
//! a TTL cache of successful verifications.

pub mod cache;
pub mod classify;
pub mod error;
pub mod key;
pub mod verifier;

pub use cache::{AuthCache, KeyDbAuthCache, MemoryAuthCache};
pub use verifier::TokenVerifier;
