//! Orchestration of the tool lifecycle: add, remove, install/update,
//! rollback, clean and list.
//!
//! Every mutating operation leaves exactly one history entry per affected
//! tool, whether it succeeds or fails.

use crate::cache::CacheStore;
use crate::config::save_config;
use crate::details;
use crate::download::ArchiveInstaller;
use crate::error::{Error, Result};
use crate::github::{ReleaseClient, ReleaseResolver};
use crate::history::{HistoryLog, OperationKind};
use crate::platform::select_asset;
use crate::privilege::{is_writable, Escalator, Privileged, SudoEscalator};
use crate::prompt::{Confirm, TermConfirm};
use crate::tool_id::RepoId;
use crate::types::{default_install_root, PlatformInfo, ReleaseMetadata, ToolConfig, ToolsetConfig};
use crate::versions::{self, RetainReport, CURRENT_LINK};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    UpToDate { version: String },
    Installed { version: String },
    Updated { from: String, to: String },
    Declined { version: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReport {
    pub repo: String,
    pub outcome: InstallOutcome,
}

impl ToolReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, InstallOutcome::Failed { .. })
    }
}

impl fmt::Display for ToolReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repo = &self.repo;
        match &self.outcome {
            InstallOutcome::UpToDate { version } => {
                write!(f, "{} is up to date (version {})", repo, version)
            }
            InstallOutcome::Installed { version } => {
                write!(f, "{} installed at version {}", repo, version)
            }
            InstallOutcome::Updated { from, to } => {
                write!(f, "{} updated from {} to {}", repo, from, to)
            }
            InstallOutcome::Declined { version } => {
                write!(f, "{} {} available, skipped", repo, version)
            }
            InstallOutcome::Failed { reason } => write!(f, "{} failed: {}", repo, reason),
        }
    }
}

/// Snapshot of one configured tool for `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    pub repo: String,
    pub version: String,
    pub install_root: PathBuf,
    pub installed: bool,
    pub linked_version: Option<String>,
    pub available: Vec<String>,
    pub latest: Option<String>,
}

pub struct ToolManager<C: ReleaseClient> {
    config: ToolsetConfig,
    config_path: PathBuf,
    client: C,
    cache: Option<CacheStore>,
    history: HistoryLog,
    escalator: Box<dyn Escalator>,
    confirm: Box<dyn Confirm>,
    target: PlatformInfo,
}

impl<C: ReleaseClient> ToolManager<C> {
    /// A manager with caching disabled, `sudo` escalation and terminal
    /// prompts, targeting the running platform.
    pub fn new(
        config: ToolsetConfig,
        config_path: impl Into<PathBuf>,
        client: C,
        history: HistoryLog,
    ) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            client,
            cache: None,
            history,
            escalator: Box::new(SudoEscalator),
            confirm: Box::new(TermConfirm),
            target: crate::platform::detect_platform(),
        }
    }

    pub fn with_cache(mut self, cache: Option<CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_escalator(mut self, escalator: Box<dyn Escalator>) -> Self {
        self.escalator = escalator;
        self
    }

    pub fn with_confirm(mut self, confirm: Box<dyn Confirm>) -> Self {
        self.confirm = confirm;
        self
    }

    pub fn with_target(mut self, target: PlatformInfo) -> Self {
        self.target = target;
        self
    }

    pub fn config(&self) -> &ToolsetConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[cfg(test)]
    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    pub fn can_escalate(&self) -> bool {
        self.escalator.probe()
    }

    fn resolver(&self) -> ReleaseResolver<'_, C> {
        ReleaseResolver::new(&self.client, self.cache.as_ref(), self.config.options.cache_expiry)
    }

    fn record(&self, operation: OperationKind, repo: &str, details: Map<String, Value>, success: bool) {
        self.history.append(operation, &[repo], details, success);
    }

    fn save(&self) -> Result<()> {
        save_config(&self.config, &self.config_path)
    }

    pub async fn add(
        &mut self,
        repo: &str,
        install_path: Option<&str>,
        install_after: bool,
    ) -> Result<Option<ToolReport>> {
        let repo_id = match RepoId::parse(repo) {
            Ok(id) => id,
            Err(e) => {
                self.record(OperationKind::Add, repo, details! {"reason" => e.to_string()}, false);
                return Err(e);
            }
        };
        let repo = repo_id.full_repo();

        if self.config.find_tool(&repo).is_some() {
            let e = Error::Config(format!("{} is already in the configuration", repo));
            self.record(OperationKind::Add, &repo, details! {"reason" => e.to_string()}, false);
            return Err(e);
        }

        let release = match self.resolver().resolve(&repo_id).await {
            Ok(release) => release,
            Err(e) => {
                self.record(
                    OperationKind::Add,
                    &repo,
                    details! {"reason" => format!("Failed to fetch release information: {}", e)},
                    false,
                );
                return Err(e);
            }
        };

        let install_path = install_path
            .map(str::to_string)
            .unwrap_or_else(|| default_install_root(&repo).display().to_string());

        self.config.tools.push(ToolConfig {
            repo: repo.clone(),
            version: release.version.clone(),
            install_path: Some(install_path.clone()),
        });

        if let Err(e) = self.save() {
            self.config.tools.retain(|t| t.repo != repo);
            self.record(
                OperationKind::Add,
                &repo,
                details! {"version" => release.version, "install_path" => install_path, "error" => e.to_string()},
                false,
            );
            return Err(e);
        }

        tracing::info!("Added {} with version {}", repo, release.version);
        self.record(
            OperationKind::Add,
            &repo,
            details! {"version" => release.version, "install_path" => install_path},
            true,
        );

        if !install_after {
            return Ok(None);
        }
        let reports = self.install(Some(&repo), false).await?;
        Ok(reports.into_iter().next())
    }

    /// Drop a tool from the configuration after confirmation. Installed
    /// files stay on disk. Returns `false` if the user declined.
    pub fn remove(&mut self, repo: &str) -> Result<bool> {
        let Some(tool) = self.config.find_tool(repo).cloned() else {
            self.record(
                OperationKind::Remove,
                repo,
                details! {"reason" => "Repository not found in configuration"},
                false,
            );
            return Err(Error::NotFound(format!("{} is not in the configuration", repo)));
        };

        let install_root = tool.install_root().display().to_string();
        let question = format!(
            "Remove {} (version {}, installed at {}) from the configuration?",
            repo, tool.version, install_root
        );
        if !self.confirm.confirm(&question) {
            tracing::info!("Removal of {} cancelled", repo);
            return Ok(false);
        }

        let previous = self.config.tools.clone();
        self.config.tools.retain(|t| t.repo != repo);

        if let Err(e) = self.save() {
            self.config.tools = previous;
            self.record(
                OperationKind::Remove,
                repo,
                details! {"version" => tool.version, "install_path" => install_root, "error" => e.to_string()},
                false,
            );
            return Err(e);
        }

        self.record(
            OperationKind::Remove,
            repo,
            details! {"version" => tool.version, "install_path" => install_root},
            true,
        );
        Ok(true)
    }

    /// Install or update one configured tool, or all of them. Failures of
    /// individual tools are reported per tool and never stop the batch.
    pub async fn install(&mut self, repo: Option<&str>, prompt: bool) -> Result<Vec<ToolReport>> {
        let repos: Vec<String> = match repo {
            Some(repo) => {
                if self.config.find_tool(repo).is_none() {
                    self.record(
                        OperationKind::Install,
                        repo,
                        details! {"reason" => "Repository not found in configuration"},
                        false,
                    );
                    return Err(Error::NotFound(format!(
                        "{} is not in the configuration",
                        repo
                    )));
                }
                vec![repo.to_string()]
            }
            None => self.config.tools.iter().map(|t| t.repo.clone()).collect(),
        };

        if !self.check_privileges(&repos, prompt)? {
            return Ok(Vec::new());
        }

        let mut reports = Vec::with_capacity(repos.len());
        for repo in repos {
            let outcome = self.install_one(&repo, prompt).await;
            reports.push(ToolReport { repo, outcome });
        }
        Ok(reports)
    }

    /// `false` when the user chose not to continue without escalation.
    fn check_privileges(&self, repos: &[String], prompt: bool) -> Result<bool> {
        let needs_escalation = repos
            .iter()
            .filter_map(|repo| self.config.find_tool(repo))
            .any(|tool| !is_writable(&tool.install_root()));

        if !needs_escalation || self.escalator.probe() {
            return Ok(true);
        }

        tracing::warn!("Installing to system directories requires privileges that are not available");
        if prompt {
            return Ok(self.confirm.confirm("Do you want to continue anyway?"));
        }

        let reason = "Privilege escalation is not available";
        let names: Vec<&str> = repos.iter().map(String::as_str).collect();
        self.history
            .append(OperationKind::Install, &names, details! {"reason" => reason}, false);
        Err(Error::Permission(reason.to_string()))
    }

    fn install_failed(&self, repo: &str, details: Map<String, Value>, reason: String) -> InstallOutcome {
        tracing::error!("Failed to install {}: {}", repo, reason);
        self.record(OperationKind::Install, repo, details, false);
        InstallOutcome::Failed { reason }
    }

    async fn install_one(&mut self, repo: &str, prompt: bool) -> InstallOutcome {
        let Some(tool) = self.config.find_tool(repo).cloned() else {
            let reason = "Repository not found in configuration".to_string();
            return self.install_failed(repo, details! {"reason" => reason}, reason);
        };

        let repo_id = match RepoId::parse(&tool.repo) {
            Ok(id) => id,
            Err(e) => return self.install_failed(repo, details! {"reason" => e.to_string()}, e.to_string()),
        };

        let release = match self.resolver().resolve(&repo_id).await {
            Ok(release) => release,
            Err(e) => {
                let reason = format!("Failed to fetch release information: {}", e);
                return self.install_failed(repo, details! {"reason" => reason}, reason);
            }
        };

        let latest = release.version.clone();
        let install_root = tool.install_root();
        let linked = versions::current_version(&install_root);

        // Only a published `current` link makes a version installed
        if latest == tool.version && linked.as_deref() == Some(latest.as_str()) {
            tracing::info!("{} is up to date (version {})", repo, latest);
            return InstallOutcome::UpToDate { version: latest };
        }
        if latest == tool.version {
            tracing::warn!("{} version {} is configured but not installed", repo, latest);
        } else {
            tracing::info!("{} update available: {} -> {}", repo, tool.version, latest);
        }

        if prompt
            && !self
                .confirm
                .confirm(&format!("Do you want to install {} version {}?", repo, latest))
        {
            return InstallOutcome::Declined { version: latest };
        }

        if let Err(e) = self.deploy(&repo_id, &release, &install_root).await {
            let reason = e.to_string();
            return self.install_failed(repo, details! {"version" => latest, "error" => reason}, reason);
        }

        let previous = tool.version.clone();
        if let Some(entry) = self.config.find_tool_mut(repo) {
            entry.version = latest.clone();
        }
        if let Err(e) = self.save() {
            let reason = format!("Failed to save configuration: {}", e);
            return self.install_failed(repo, details! {"version" => latest, "error" => reason}, reason);
        }

        let install_path = install_root.display().to_string();
        let outcome = if !previous.is_empty() && previous != latest {
            self.record(
                OperationKind::Update,
                repo,
                details! {"from_version" => previous, "to_version" => latest, "install_path" => install_path},
                true,
            );
            InstallOutcome::Updated {
                from: previous,
                to: latest.clone(),
            }
        } else {
            self.record(
                OperationKind::Install,
                repo,
                details! {"version" => latest, "install_path" => install_path},
                true,
            );
            InstallOutcome::Installed {
                version: latest.clone(),
            }
        };

        if self.config.options.auto_cleanup {
            // Outcome of the cleanup is recorded on its own
            let _ = self.clean_tool(repo, &install_root, &latest);
        }
        outcome
    }

    /// Select, fetch and extract the release asset, then point `current`
    /// at the new version directory.
    async fn deploy(
        &self,
        repo_id: &RepoId,
        release: &ReleaseMetadata,
        install_root: &Path,
    ) -> Result<()> {
        let asset = select_asset(&repo_id.short_name(), &release.assets, &self.target).ok_or_else(|| {
            Error::NotFound(format!(
                "no suitable asset for {}/{} in {} {}",
                self.target.platform, self.target.arch, repo_id, release.version
            ))
        })?;
        tracing::info!("Installing {} version {} from {}", repo_id, release.version, asset.download_url);

        let privileged = Privileged::new(self.escalator.as_ref());
        let installer = ArchiveInstaller::new(&self.client, self.cache.as_ref(), &privileged);
        let version_dir = install_root.join(&release.version);

        // Leftovers of an earlier failed attempt
        let linked = versions::current_version(install_root);
        if version_dir.exists() && linked.as_deref() != Some(release.version.as_str()) {
            tracing::info!("Replacing unpublished directory {}", version_dir.display());
            privileged.remove_path(&version_dir)?;
        }
        installer
            .install(&release.version, &asset.download_url, &version_dir)
            .await?;

        versions::publish(&version_dir, &install_root.join(CURRENT_LINK), &privileged)
    }

    pub fn rollback(&mut self, repo: &str) -> Result<(String, String)> {
        let current = self
            .config
            .find_tool(repo)
            .map(|t| t.version.clone())
            .unwrap_or_default();

        match self.try_rollback(repo) {
            Ok((from, to)) => {
                tracing::info!("Rolled back {} from {} to {}", repo, from, to);
                self.record(
                    OperationKind::Rollback,
                    repo,
                    details! {"from_version" => from, "to_version" => to},
                    true,
                );
                Ok((from, to))
            }
            Err(e) => {
                self.record(
                    OperationKind::Rollback,
                    repo,
                    details! {"current_version" => current, "reason" => e.to_string()},
                    false,
                );
                Err(e)
            }
        }
    }

    fn try_rollback(&mut self, repo: &str) -> Result<(String, String)> {
        let tool = self
            .config
            .find_tool(repo)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} is not in the configuration", repo)))?;

        let install_root = tool.install_root();
        let installed = versions::installed_versions(&install_root)?;
        let target = versions::rollback_target(&installed, &tool.version, repo)?;

        let privileged = Privileged::new(self.escalator.as_ref());
        versions::publish(
            &install_root.join(&target),
            &install_root.join(CURRENT_LINK),
            &privileged,
        )?;

        if let Some(entry) = self.config.find_tool_mut(repo) {
            entry.version = target.clone();
        }
        self.save()?;
        Ok((tool.version, target))
    }

    fn clean_tool(&self, repo: &str, install_root: &Path, current: &str) -> Result<RetainReport> {
        let privileged = Privileged::new(self.escalator.as_ref());
        let keep = self.config.options.keep_versions;

        match versions::retain(install_root, current, keep, &privileged) {
            Ok(report) => {
                self.record(
                    OperationKind::Clean,
                    repo,
                    details! {
                        "kept_versions" => report.kept,
                        "removed_versions" => report.removed,
                        "failed" => report.failed,
                    },
                    report.failed.is_empty(),
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("Failed to clean versions for {}: {}", repo, e);
                self.record(OperationKind::Clean, repo, details! {"error" => e.to_string()}, false);
                Err(e)
            }
        }
    }

    /// Apply the retention policy to every tool with an install directory.
    pub fn clean(&self) -> Vec<(String, Result<RetainReport>)> {
        self.config
            .tools
            .iter()
            .filter(|tool| tool.install_root().exists())
            .map(|tool| {
                let result = self.clean_tool(&tool.repo, &tool.install_root(), &tool.version);
                (tool.repo.clone(), result)
            })
            .collect()
    }

    pub async fn list(&self) -> Vec<ToolStatus> {
        let mut statuses = Vec::with_capacity(self.config.tools.len());
        for tool in &self.config.tools {
            let install_root = tool.install_root();
            let linked_version = versions::current_version(&install_root);
            let installed = !tool.version.is_empty()
                && linked_version.as_deref() == Some(tool.version.as_str())
                && install_root.join(&tool.version).is_dir();
            let available = versions::installed_versions(&install_root).unwrap_or_default();

            let latest = match RepoId::parse(&tool.repo) {
                Ok(id) => match self.resolver().resolve(&id).await {
                    Ok(release) => Some(release.version),
                    Err(e) => {
                        tracing::warn!("Could not get latest release for {}: {}", tool.repo, e);
                        None
                    }
                },
                Err(_) => None,
            };

            statuses.push(ToolStatus {
                repo: tool.repo.clone(),
                version: tool.version.clone(),
                linked_version,
                install_root,
                installed,
                available,
                latest,
            });
        }
        statuses
    }
}
