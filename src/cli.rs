use clap::{Parser, Subcommand};
use std::path::PathBuf;

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // Release builds are tagged
    if let Some(tag) = option_env!("TOOLSET_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("TOOLSET_GIT_COMMIT").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{}", BASE_VERSION, commit);
    Box::leak(version.into_boxed_str())
}

pub fn version_string() -> &'static str {
    get_version()
}

#[derive(Parser)]
#[command(name = "toolset")]
#[command(about = "Versioned installs of CLI tools from GitHub Releases")]
#[command(version = get_version(), propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the toolset configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable caching for this run
    #[arg(long, global = true, conflicts_with = "force_cache")]
    pub no_cache: bool,

    /// Enable caching for this run, ignoring the config setting
    #[arg(long, global = true)]
    pub force_cache: bool,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Defaults to `check`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a default configuration file
    Init,

    /// List configured tools with installed and latest versions
    List,

    /// Add a repository to the configuration
    Add {
        /// GitHub repository (e.g., 'jesseduffield/lazygit')
        repo: String,
        /// Directory for versioned installs (default: /opt/<name>)
        #[arg(long)]
        install_path: Option<String>,
        /// Install the tool right after adding it
        #[arg(long)]
        install: bool,
    },

    /// Remove a repository from the configuration (installed files are kept)
    Remove {
        /// GitHub repository (e.g., 'owner/repo')
        repo: String,
    },

    /// Install or update one tool, or all of them
    Install {
        /// Repository to install, or 'all'
        repo: Option<String>,
        /// Target platform (linux, darwin, windows)
        #[arg(long)]
        platform: Option<String>,
        /// Target architecture (x86_64, aarch64, arm)
        #[arg(long)]
        arch: Option<String>,
    },

    /// Check every tool for updates and ask before installing
    Check,

    /// Point a tool back at its previous installed version
    Rollback {
        /// GitHub repository (e.g., 'owner/repo')
        repo: String,
    },

    /// Remove old versions beyond `keep_versions`
    Clean,

    /// Manage the download and API cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show the history of tool operations
    History {
        /// Show at most N entries
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Check whether privilege escalation is available
    CheckSudo,

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Delete all cached API responses and downloads
    Clear,
    /// Show cache location and statistics
    Info,
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// Delete the history log
    Clear,
}
