//! Forge backend abstraction layer.
//!
//! The verifier only needs the status code of one request against the
//! provider's commit endpoint.  [`ForgeBackend`] hides how that request is
//! built and sent, so the verifier can be driven by a stub in tests.

pub mod github;

use anyhow::Result;
use reqwest::StatusCode;

use crate::config::UpstreamConfig;

/// Abstraction over the upstream commit API.
#[async_trait::async_trait]
pub trait ForgeBackend: Send + Sync {
    /// Probe `owner/repo@commit` with `token` and return the response status.
    ///
    /// An `Err` means no response was received (connection, timeout, request
    /// construction).  Redirects are returned, never followed.
    async fn probe_commit(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<StatusCode>;

    /// Unauthenticated reachability check used by `/healthz`.
    async fn check_reachable(&self) -> Result<StatusCode>;
}

/// Check that `value` stays a single path segment once substituted into an
/// upstream URL.
///
/// Rejects empty and dot segments, separators, characters that start a query
/// or fragment, percent signs (the value arrives already decoded) and control
/// characters.
pub fn validate_path_segment(field: &str, value: &str) -> Result<()> {
    anyhow::ensure!(!value.is_empty(), "{field} must not be empty");
    anyhow::ensure!(
        value != "." && value != "..",
        "{field} must not be a dot segment"
    );
    if let Some(c) = value
        .chars()
        .find(|&c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control())
    {
        anyhow::bail!("{field} contains reserved character {c:?}");
    }
    Ok(())
}

/// Build the forge backend for the configured upstream.
pub fn build_backend(config: &UpstreamConfig) -> Result<Box<dyn ForgeBackend>> {
    Ok(Box::new(github::GitHubBackend::new(config)?))
}
