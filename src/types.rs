use crate::tool_id::RepoId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_INSTALL_PREFIX: &str = "/opt";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    pub repo: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<String>,
}

impl ToolConfig {
    /// Directory holding the versioned installs and the `current` link.
    pub fn install_root(&self) -> PathBuf {
        match &self.install_path {
            Some(path) => PathBuf::from(path),
            None => default_install_root(&self.repo),
        }
    }
}

pub fn default_install_root(repo: &str) -> PathBuf {
    let short_name = RepoId::parse(repo)
        .map(|id| id.name)
        .unwrap_or_else(|_| repo.rsplit('/').next().unwrap_or(repo).to_string());
    PathBuf::from(DEFAULT_INSTALL_PREFIX).join(short_name)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolsetOptions {
    #[serde(default = "default_keep_versions")]
    pub keep_versions: usize,
    #[serde(default = "default_auto_cleanup")]
    pub auto_cleanup: bool,
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_expiry")]
    pub cache_expiry: u64,
}

fn default_keep_versions() -> usize {
    2
}
fn default_auto_cleanup() -> bool {
    false
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_expiry() -> u64 {
    3600
}

impl Default for ToolsetOptions {
    fn default() -> Self {
        Self {
            keep_versions: default_keep_versions(),
            auto_cleanup: default_auto_cleanup(),
            cache_enabled: default_cache_enabled(),
            cache_expiry: default_cache_expiry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ToolsetConfig {
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub options: ToolsetOptions,
}

impl ToolsetConfig {
    pub fn find_tool(&self, repo: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.repo == repo)
    }

    pub fn find_tool_mut(&mut self, repo: &str) -> Option<&mut ToolConfig> {
        self.tools.iter_mut().find(|t| t.repo == repo)
    }
}

/// Canonical platform/arch pair used for asset selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub platform: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub version: String,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubAsset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}
