//! Errors returned by [`TokenVerifier::verify`](crate::auth::TokenVerifier::verify).

use reqwest::StatusCode;
use thiserror::Error;

use crate::auth::classify::RejectReason;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons a verification does not succeed.  Callers treat every variant as
/// "access denied"; the variant only matters for logs and metrics.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// No token was presented.  Fails before any cache or network access.
    #[error("token is empty")]
    EmptyCredential,

    /// The upstream answered with a status that rejects the credential.
    #[error("upstream rejected credential: {status} ({reason})")]
    Unauthenticated {
        status: StatusCode,
        reason: RejectReason,
    },

    /// The probe never produced a response.
    #[error("upstream request failed: {0}")]
    Transport(#[source] BoxError),
}
