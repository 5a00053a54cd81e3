//! Commit-scoped token verification against the upstream forge API.
//!
//! A token is accepted for `owner/repo` when the forge does not reject a
//! probe of the commit endpoint made with it.  Accepted triples are cached
//! under a [`VerificationKey`] so that repeated checks skip the upstream
//! call; rejections are never cached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};

use crate::auth::cache::AuthCache;
use crate::auth::classify::{classify, Classification, StatusPolicy};
use crate::auth::error::VerifyError;
use crate::auth::key::VerificationKey;
use crate::forge::ForgeBackend;
use crate::metrics::{MetricsRegistry, Outcome, StatusClass};

/// Lifetime of a positive verification (7 days).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Value stored for a verified key.
const VERIFIED_MARKER: &str = "true";

/// How a successful verification was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verified {
    /// Served from the cache without contacting the forge.
    Cached,
    /// The forge accepted the credential with `status`.
    Upstream { status: StatusCode },
}

impl Verified {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached)
    }

    /// Status the forge answered with; `None` for cache hits.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            Self::Cached => None,
            Self::Upstream { status } => Some(*status),
        }
    }
}

pub struct TokenVerifier {
    cache: Arc<dyn AuthCache>,
    forge: Arc<dyn ForgeBackend>,
    metrics: MetricsRegistry,
    policy: StatusPolicy,
    ttl: Duration,
}

impl TokenVerifier {
    pub fn new(
        cache: Arc<dyn AuthCache>,
        forge: Arc<dyn ForgeBackend>,
        metrics: MetricsRegistry,
    ) -> Self {
        Self {
            cache,
            forge,
            metrics,
            policy: StatusPolicy::default(),
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_policy(mut self, policy: StatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Verify that `token` is accepted by the forge for `owner/repo@commit`.
    ///
    /// Makes at most one upstream request and at most one cache write.  Any
    /// `Err` means access denied.
    #[instrument(skip(self, token), fields(%owner, %repo, %commit))]
    pub async fn verify(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Verified, VerifyError> {
        let result = self.verify_uncounted(token, owner, repo, commit).await;
        let outcome = match &result {
            Ok(Verified::Cached) => Outcome::Cached,
            Ok(Verified::Upstream { .. }) => Outcome::Authenticated,
            Err(VerifyError::EmptyCredential) => Outcome::EmptyCredential,
            Err(VerifyError::Unauthenticated { .. }) => Outcome::Unauthenticated,
            Err(VerifyError::Transport(_)) => Outcome::TransportError,
        };
        self.metrics.metrics.record_outcome(outcome);
        result
    }

    async fn verify_uncounted(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<Verified, VerifyError> {
        if token.is_empty() {
            warn!("token is empty");
            return Err(VerifyError::EmptyCredential);
        }

        // 1. Hash the triple for the cache key.
        let key = VerificationKey::derive(owner, repo, token);

        // 2. Check the cache.  A read failure only costs an upstream call.
        match self.cache.get(key.as_bytes()).await {
            Ok(Some(value)) if value == VERIFIED_MARKER => {
                self.metrics.metrics.auth_cache_hits.inc();
                debug!(%key, "verification cache hit");
                return Ok(Verified::Cached);
            }
            Ok(_) => {}
            Err(e) => warn!(%key, error = %e, "verification cache read failed, treating as miss"),
        }
        self.metrics.metrics.auth_cache_misses.inc();

        // 3. Probe the forge.
        let started = Instant::now();
        let probe = self.forge.probe_commit(token, owner, repo, commit).await;
        self.metrics
            .metrics
            .upstream_api_duration_seconds
            .observe(started.elapsed().as_secs_f64());

        let status = match probe {
            Ok(status) => status,
            Err(e) => {
                self.metrics.metrics.record_upstream(StatusClass::Error);
                let cause = format!("{e:#}");
                warn!(error = %cause, "upstream commit probe failed");
                return Err(VerifyError::Transport(e.into()));
            }
        };
        self.metrics.metrics.record_upstream(StatusClass::of(status));

        // 4. Decide, and cache only on success.
        match classify(status, self.policy) {
            Classification::Rejected(reason) => {
                warn!(%status, %reason, "upstream rejected credential");
                Err(VerifyError::Unauthenticated { status, reason })
            }
            Classification::Authenticated => {
                info!(%status, "credential accepted by upstream");
                if let Err(e) = self.cache.set(key.as_bytes(), VERIFIED_MARKER, self.ttl).await {
                    self.metrics.metrics.auth_cache_write_failures.inc();
                    warn!(%key, error = %e, "failed to cache verification");
                }
                Ok(Verified::Upstream { status })
            }
        }
    }
}
