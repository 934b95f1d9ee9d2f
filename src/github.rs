//! GitHub release lookup.
//!
//! Provides the [`ReleaseClient`] seam over the network, its `reqwest`
//! implementation, and the cache-aware [`ReleaseResolver`].

use crate::cache::CacheStore;
use crate::download::download_file;
use crate::error::{Error, Result};
use crate::tool_id::RepoId;
use crate::types::{Asset, GitHubRelease, ReleaseMetadata};
use reqwest::StatusCode;
use std::path::Path;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Network access needed to resolve and fetch releases.
#[allow(async_fn_in_trait)]
pub trait ReleaseClient {
    /// Raw JSON of the latest release of `repo`.
    async fn latest_release(&self, repo: &RepoId) -> Result<serde_json::Value>;

    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new() -> Self {
        let api_base =
            std::env::var("TOOLSET_GITHUB_API").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::with_api_base(api_base)
    }

    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn latest_release_url(&self, repo: &RepoId) -> String {
        format!("{}/repos/{}/releases/latest", self.api_base, repo)
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseClient for GitHubClient {
    async fn latest_release(&self, repo: &RepoId) -> Result<serde_json::Value> {
        let url = self.latest_release_url(repo);
        tracing::debug!("Fetching GitHub release info from: {}", url);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("toolset/", env!("CARGO_PKG_VERSION")));

        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            request = request.header("Authorization", format!("token {}", token));
            tracing::debug!("Using GITHUB_TOKEN");
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::network(repo.full_repo(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!(
                "no releases found for {} (Status: 404)",
                repo
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::network(
                repo.full_repo(),
                format!("GitHub API request failed: {} - {}", status, body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::network(repo.full_repo(), e))?;
        serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("invalid release JSON for {}: {}", repo, e)))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        download_file(&self.http, url, dest).await
    }
}

/// Strip one optional leading `v`. An empty or blank result is an error.
pub fn normalize_tag(tag: &str) -> Result<String> {
    let version = tag.strip_prefix('v').unwrap_or(tag);
    if version.trim().is_empty() {
        return Err(Error::Parse(format!("could not parse tag name '{}'", tag)));
    }
    Ok(version.to_string())
}

/// Normalize a raw release payload. Assets without a download URL are dropped.
pub fn parse_release(payload: &serde_json::Value) -> Result<ReleaseMetadata> {
    let release: GitHubRelease = serde_json::from_value(payload.clone())
        .map_err(|e| Error::Parse(format!("malformed release payload: {}", e)))?;

    let version = normalize_tag(&release.tag_name)?;
    let assets = release
        .assets
        .into_iter()
        .filter(|a| !a.browser_download_url.is_empty())
        .map(|a| Asset {
            name: a.name,
            download_url: a.browser_download_url,
        })
        .collect();

    Ok(ReleaseMetadata { version, assets })
}

pub struct ReleaseResolver<'a, C: ReleaseClient> {
    client: &'a C,
    cache: Option<&'a CacheStore>,
    ttl: u64,
}

impl<'a, C: ReleaseClient> ReleaseResolver<'a, C> {
    /// `cache` is `None` when caching is disabled for this run.
    pub fn new(client: &'a C, cache: Option<&'a CacheStore>, ttl: u64) -> Self {
        Self { client, cache, ttl }
    }

    pub async fn resolve(&self, repo: &RepoId) -> Result<ReleaseMetadata> {
        if let Some(cache) = self.cache {
            if let Some(payload) = cache.get_api(repo, self.ttl) {
                tracing::info!("Using cached release information for {}", repo);
                return parse_release(&payload);
            }
        }

        tracing::info!("Fetching release information for {}...", repo);
        let payload = self.client.latest_release(repo).await?;

        if let Some(cache) = self.cache {
            if let Err(e) = cache.put_api(repo, &payload, self.ttl) {
                tracing::warn!("Failed to cache release information for {}: {}", repo, e);
            }
        }

        parse_release(&payload)
    }
}
