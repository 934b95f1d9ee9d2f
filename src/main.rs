mod cache;
mod cli;
mod config;
mod download;
mod error;
mod github;
mod history;
mod install;
mod platform;
mod privilege;
mod prompt;
mod tool_id;
mod types;
mod versions;

#[cfg(test)]
mod test_support;

use anyhow::{anyhow, Context, Result};
use cache::CacheStore;
use clap::Parser;
use cli::{version_string, CacheAction, Cli, Commands, HistoryAction};
use config::{
    create_default_config, default_init_path, find_config_file, get_cache_dir,
    get_history_file_path, load_config,
};
use github::{GitHubClient, ReleaseClient};
use history::{format_entry, HistoryLog};
use install::{InstallOutcome, ToolManager, ToolReport};
use platform::resolve_target;
use prompt::AssumeYes;
use types::ToolsetOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    setup_logging(&cli)?;

    let command = cli.command.take().unwrap_or(Commands::Check);
    match command {
        Commands::Version => {
            println!("toolset {}", version_string());
        }

        Commands::Init => {
            let path = default_init_path()?;
            create_default_config(&path)?;
            println!("Created configuration at {}", path.display());
        }

        Commands::Cache { action } => {
            let store = CacheStore::new(get_cache_dir()?);
            match action {
                CacheAction::Clear => {
                    if store.clear()? {
                        println!("Cache cleared at {}", store.root().display());
                    } else {
                        println!("No cache directory at {}", store.root().display());
                    }
                }
                CacheAction::Info => print_cache_info(&store),
            }
        }

        Commands::History { limit, action } => {
            let history = HistoryLog::new(get_history_file_path()?);
            match action {
                Some(HistoryAction::Clear) => {
                    if history.clear()? {
                        println!("History cleared at {}", history.path().display());
                    } else {
                        println!("No history to clear");
                    }
                }
                None => print_history(&history, limit),
            }
        }

        command => run_managed(&cli, command).await?,
    }

    Ok(())
}

/// Commands that need the configuration and a tool manager.
async fn run_managed(cli: &Cli, command: Commands) -> Result<()> {
    let config_path = find_config_file(cli.config.as_deref());
    let config = load_config(&config_path).with_context(|| {
        format!(
            "Could not load configuration from {} (run `toolset init` to create one)",
            config_path.display()
        )
    })?;
    tracing::debug!("Using configuration at {}", config_path.display());

    let cache = if cache_enabled(cli, &config.options) {
        Some(CacheStore::new(get_cache_dir()?))
    } else {
        None
    };

    let mut manager = ToolManager::new(
        config,
        config_path,
        GitHubClient::new(),
        HistoryLog::new(get_history_file_path()?),
    )
    .with_cache(cache);
    if cli.yes {
        manager = manager.with_confirm(Box::new(AssumeYes));
    }

    match command {
        Commands::List => print_tools(&manager).await,

        Commands::Add {
            repo,
            install_path,
            install,
        } => {
            let report = manager.add(&repo, install_path.as_deref(), install).await?;
            println!("Added {}", repo);
            if let Some(report) = report {
                finish(&[report])?;
            }
        }

        Commands::Remove { repo } => {
            if manager.remove(&repo)? {
                println!("Removed {} from the configuration", repo);
            } else {
                println!("Removal cancelled");
            }
        }

        Commands::Install {
            repo,
            platform,
            arch,
        } => {
            if platform.is_some() || arch.is_some() {
                let target = resolve_target(platform.as_deref(), arch.as_deref());
                tracing::info!("Targeting {}/{}", target.platform, target.arch);
                manager = manager.with_target(target);
            }
            let repo = repo.filter(|r| r != "all");
            let reports = manager.install(repo.as_deref(), false).await?;
            finish(&reports)?;
        }

        Commands::Check => {
            let reports = manager.install(None, true).await?;
            finish(&reports)?;
            let updated = reports
                .iter()
                .any(|r| matches!(r.outcome, InstallOutcome::Updated { .. }));
            if updated && !manager.config().options.auto_cleanup {
                println!("Tip: run `toolset clean` to remove old versions");
            }
        }

        Commands::Rollback { repo } => {
            let (from, to) = manager.rollback(&repo)?;
            println!("Rolled back {} from {} to {}", repo, from, to);
        }

        Commands::Clean => {
            let mut failed = 0;
            for (repo, result) in manager.clean() {
                match result {
                    Ok(report) => {
                        let removed = if report.removed.is_empty() {
                            "nothing".to_string()
                        } else {
                            report.removed.join(", ")
                        };
                        println!("{}: removed {}", repo, removed);
                        if !report.failed.is_empty() {
                            failed += 1;
                            println!("{}: failed to remove {}", repo, report.failed.join(", "));
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{}: {}", repo, e);
                    }
                }
            }
            if failed > 0 {
                return Err(anyhow!("Cleanup failed for {} tool(s)", failed));
            }
        }

        Commands::CheckSudo => {
            if manager.can_escalate() {
                println!("Privilege escalation is available");
            } else {
                return Err(anyhow!(
                    "Privilege escalation is not available; run `sudo -v` or use writable install paths"
                ));
            }
        }

        // Handled in main before the configuration is loaded
        Commands::Version | Commands::Init | Commands::Cache { .. } | Commands::History { .. } => {}
    }

    Ok(())
}

/// `--no-cache` wins over `--force-cache`, which wins over the config.
fn cache_enabled(cli: &Cli, options: &ToolsetOptions) -> bool {
    if cli.no_cache {
        false
    } else if cli.force_cache {
        true
    } else {
        options.cache_enabled
    }
}

fn finish(reports: &[ToolReport]) -> Result<()> {
    for report in reports {
        println!("{}", report);
    }
    let failed = reports.iter().filter(|r| r.is_failure()).count();
    if failed > 0 {
        return Err(anyhow!("{} of {} tool(s) failed", failed, reports.len()));
    }
    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

async fn print_tools<C: ReleaseClient>(manager: &ToolManager<C>) {
    println!("--- Configured Tools ---");
    let statuses = manager.list().await;
    if statuses.is_empty() {
        println!("  No tools configured yet.");
        return;
    }

    for status in statuses {
        let state = if status.installed {
            "installed"
        } else {
            "not installed"
        };
        println!("  - {} (v{}) [{}]", status.repo, status.version, state);
        println!("    Path:      {}", status.install_root.display());
        if let Some(linked) = &status.linked_version {
            println!("    Current:   {}", linked);
        }
        if !status.available.is_empty() {
            println!("    Available: {}", status.available.join(", "));
        }
        match &status.latest {
            Some(latest) if latest != &status.version => {
                println!("    Latest:    {} (update available)", latest)
            }
            Some(latest) => println!("    Latest:    {}", latest),
            None => println!("    Latest:    unknown"),
        }
        println!();
    }
    println!("------------------------");
}

fn print_cache_info(store: &CacheStore) {
    let stats = store.stats();
    println!("--- Cache ---");
    println!("  Location:  {}", stats.path.display());
    if !stats.exists {
        println!("  No cache directory yet.");
        return;
    }
    println!(
        "  API:       {} entries, {}",
        stats.api_entries,
        human_bytes(stats.api_bytes)
    );
    println!(
        "  Downloads: {} entries, {}",
        stats.download_entries,
        human_bytes(stats.download_bytes)
    );
    println!("  Total:     {}", human_bytes(stats.total_bytes()));
}

fn print_history(history: &HistoryLog, limit: Option<usize>) {
    let entries = history.query(limit);
    println!("--- History ---");
    if entries.is_empty() {
        println!("  No history entries.");
        return;
    }
    for entry in &entries {
        println!("  {}", format_entry(entry));
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
