//! On-disk cache for release API responses and downloaded archives.
//!
//! API responses live under `api/` as one JSON blob per repository and expire
//! after their TTL. Downloads live under `downloads/`, named by the SHA-256 of
//! the source URL, and never expire.

use crate::error::Result;
use crate::tool_id::RepoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const API_DIR: &str = "api";
const DOWNLOADS_DIR: &str = "downloads";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCacheEntry {
    pub repository_id: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub ttl: Option<u64>,
    pub payload: serde_json::Value,
}

impl ApiCacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, default_ttl: u64) -> bool {
        let ttl = self.ttl.unwrap_or(default_ttl) as i64;
        (now - self.fetched_at).num_seconds() < ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub exists: bool,
    pub path: PathBuf,
    pub api_entries: usize,
    pub api_bytes: u64,
    pub download_entries: usize,
    pub download_bytes: u64,
}

impl CacheStats {
    pub fn total_bytes(&self) -> u64 {
        self.api_bytes + self.download_bytes
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn api_path(&self, repo: &RepoId) -> PathBuf {
        self.root
            .join(API_DIR)
            .join(format!("{}.json", repo.cache_key()))
    }

    fn download_path(&self, url: &str) -> PathBuf {
        self.root.join(DOWNLOADS_DIR).join(url_key(url))
    }

    pub fn get_api(&self, repo: &RepoId, default_ttl: u64) -> Option<serde_json::Value> {
        self.get_api_at(repo, default_ttl, Utc::now())
    }

    pub fn get_api_at(
        &self,
        repo: &RepoId,
        default_ttl: u64,
        now: DateTime<Utc>,
    ) -> Option<serde_json::Value> {
        let path = self.api_path(repo);
        let content = fs::read_to_string(&path).ok()?;
        let entry: ApiCacheEntry = match serde_json::from_str(&content) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                return None;
            }
        };

        if entry.is_fresh(now, default_ttl) {
            tracing::debug!("API cache hit for {}", repo);
            Some(entry.payload)
        } else {
            tracing::debug!("API cache entry for {} expired", repo);
            None
        }
    }

    pub fn put_api(&self, repo: &RepoId, payload: &serde_json::Value, ttl: u64) -> Result<()> {
        self.put_api_at(repo, payload, ttl, Utc::now())
    }

    pub fn put_api_at(
        &self,
        repo: &RepoId,
        payload: &serde_json::Value,
        ttl: u64,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.api_path(repo);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let entry = ApiCacheEntry {
            repository_id: repo.full_repo(),
            fetched_at,
            ttl: Some(ttl),
            payload: payload.clone(),
        };
        fs::write(&path, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    pub fn get_download(&self, url: &str) -> Option<PathBuf> {
        let path = self.download_path(url);
        path.is_file().then_some(path)
    }

    /// Copy `file` into the download area and return the cached path.
    pub fn put_download(&self, url: &str, file: &Path) -> Result<PathBuf> {
        let path = self.download_path(url);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(file, &path)?;
        tracing::debug!("Cached download of {} at {}", url, path.display());
        Ok(path)
    }

    /// Remove every entry. Returns `false` when there was no cache directory.
    pub fn clear(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(false);
        }
        for area in [API_DIR, DOWNLOADS_DIR] {
            let dir = self.root.join(area);
            if !dir.exists() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        Ok(true)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            exists: self.root.exists(),
            path: self.root.clone(),
            ..CacheStats::default()
        };
        if !stats.exists {
            return stats;
        }
        (stats.api_entries, stats.api_bytes) = area_usage(&self.root.join(API_DIR));
        (stats.download_entries, stats.download_bytes) =
            area_usage(&self.root.join(DOWNLOADS_DIR));
        stats
    }
}

fn area_usage(dir: &Path) -> (usize, u64) {
    WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(count, bytes), entry| {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            (count + 1, bytes + size)
        })
}

/// Stable, file-name-safe key for a download URL.
pub fn url_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}
