//! GitHub / GitHub Enterprise backend implementation.
//!
//! The commit endpoint is probed with the status payload of a commit-status
//! write; only the response status is inspected.

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::Serialize;

use crate::config::UpstreamConfig;

use super::{validate_path_segment, ForgeBackend};

const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";

#[derive(Debug, Serialize)]
struct StatusPayload {
    state: &'static str,
    context: &'static str,
    description: &'static str,
}

const PROBE_PAYLOAD: StatusPayload = StatusPayload {
    state: "success",
    context: "coveritup",
    description: "authenticated",
};

// ---------------------------------------------------------------------------
// Backend struct
// ---------------------------------------------------------------------------

pub struct GitHubBackend {
    client: reqwest::Client,
    api_url: Url,
    accept: String,
    api_version: String,
}

impl GitHubBackend {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("coveritup-auth/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .context("failed to build reqwest client")?;

        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid upstream API URL: {}", config.api_url))?;
        anyhow::ensure!(
            !api_url.cannot_be_a_base(),
            "upstream API URL cannot carry a path: {api_url}"
        );

        Ok(Self {
            client,
            api_url,
            accept: config.accept.clone(),
            api_version: config.api_version.clone(),
        })
    }

    /// Append `segments` to the API root, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("upstream API URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{api}/repos/{owner}/{repo}/commits/{ref}`
    fn commit_url(&self, owner: &str, repo: &str, commit: &str) -> Result<Url> {
        validate_path_segment("owner", owner)?;
        validate_path_segment("repo", repo)?;
        validate_path_segment("commit", commit)?;
        self.endpoint(&["repos", owner, repo, "commits", commit])
    }
}

// ---------------------------------------------------------------------------
// Trait implementation
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl ForgeBackend for GitHubBackend {
    async fn probe_commit(
        &self,
        token: &str,
        owner: &str,
        repo: &str,
        commit: &str,
    ) -> Result<StatusCode> {
        let url = self.commit_url(owner, repo, commit)?;

        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, &self.accept)
            .header(API_VERSION_HEADER, &self.api_version)
            .json(&PROBE_PAYLOAD)
            .send()
            .await
            .context("upstream API request failed")?;

        Ok(resp.status())
    }

    async fn check_reachable(&self) -> Result<StatusCode> {
        let url = self.endpoint(&["meta"])?;
        let resp = self
            .client
            .head(url.clone())
            .header(ACCEPT, &self.accept)
            .send()
            .await
            .with_context(|| format!("HEAD {url} failed"))?;
        Ok(resp.status())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
