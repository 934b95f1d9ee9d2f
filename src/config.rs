use crate::error::{Error, Result};
use crate::types::*;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "toolset";
pub const CONFIG_FILE_NAME: &str = "toolset.yaml";
pub const SYSTEM_CONFIG_DIR: &str = "/etc/toolset";
pub const HISTORY_DIR_NAME: &str = "history";
pub const HISTORY_FILE_NAME: &str = "history.json";

pub fn get_user_config_dir() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?
        .join(APP_NAME);
    tracing::debug!("User config directory: {}", path.display());
    Ok(path)
}

pub fn get_cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TOOLSET_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let path = dirs::cache_dir()
        .ok_or_else(|| Error::Config("Could not determine cache directory".to_string()))?
        .join(APP_NAME);
    Ok(path)
}

pub fn get_history_file_path() -> Result<PathBuf> {
    if let Ok(file) = std::env::var("TOOLSET_HISTORY_FILE") {
        return Ok(PathBuf::from(file));
    }
    Ok(get_user_config_dir()?
        .join(HISTORY_DIR_NAME)
        .join(HISTORY_FILE_NAME))
}

/// Locate the toolset document. The first existing candidate wins; when none
/// exists the explicit path (or the bare file name) is returned so the
/// subsequent load reports a useful error.
pub fn find_config_file(explicit: Option<&Path>) -> PathBuf {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Ok(path) = std::env::var("TOOLSET_CONFIG") {
        // An env override is authoritative even before the file exists
        if explicit.is_none() {
            return PathBuf::from(path);
        }
        candidates.push(PathBuf::from(path));
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(CONFIG_FILE_NAME));
    }
    if let Ok(dir) = get_user_config_dir() {
        candidates.push(dir.join(CONFIG_FILE_NAME));
    }
    candidates.push(Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME));

    for candidate in &candidates {
        tracing::trace!("Checking for config at {}", candidate.display());
        if candidate.is_file() {
            return candidate.clone();
        }
    }

    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Path `init` writes to: the env override when set, else the user config dir.
pub fn default_init_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TOOLSET_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    Ok(get_user_config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn parse_config(content: &str) -> Result<ToolsetConfig> {
    if content.trim().is_empty() {
        return Ok(ToolsetConfig::default());
    }
    let mut config: ToolsetConfig = serde_yaml::from_str(content)
        .map_err(|e| Error::Config(format!("Error parsing YAML: {}", e)))?;

    if config.options.keep_versions == 0 {
        tracing::warn!("keep_versions must be at least 1; using 1");
        config.options.keep_versions = 1;
    }
    Ok(config)
}

pub fn load_config(config_path: &Path) -> Result<ToolsetConfig> {
    if !config_path.exists() {
        return Err(Error::Config(format!(
            "Config file not found at: {}",
            config_path.display()
        )));
    }

    let content = fs::read_to_string(config_path).map_err(|e| {
        Error::Config(format!(
            "Could not read config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config.options);
    Ok(config)
}

fn apply_env_overrides(options: &mut ToolsetOptions) {
    if let Ok(value) = std::env::var("TOOLSET_KEEP_VERSIONS") {
        if let Ok(keep) = value.parse::<usize>() {
            options.keep_versions = keep.max(1);
        }
    }

    if let Ok(value) = std::env::var("TOOLSET_AUTO_CLEANUP") {
        options.auto_cleanup = parse_bool(&value);
    }

    if let Ok(value) = std::env::var("TOOLSET_CACHE_ENABLED") {
        options.cache_enabled = parse_bool(&value);
    }

    if let Ok(value) = std::env::var("TOOLSET_CACHE_EXPIRY") {
        if let Ok(expiry) = value.parse::<u64>() {
            options.cache_expiry = expiry;
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

pub fn save_config(config: &ToolsetConfig, config_path: &Path) -> Result<()> {
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let content = serde_yaml::to_string(config)?;
    fs::write(config_path, content).map_err(|e| {
        Error::Config(format!(
            "Failed to save config file {}: {}",
            config_path.display(),
            e
        ))
    })?;
    Ok(())
}

/// Write a default document. Refuses to overwrite an existing file.
pub fn create_default_config(config_path: &Path) -> Result<ToolsetConfig> {
    if config_path.exists() {
        return Err(Error::Config(format!(
            "Config file already exists at {}",
            config_path.display()
        )));
    }
    let config = ToolsetConfig::default();
    save_config(&config, config_path)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_options_are_backfilled() {
        let config = parse_config("tools:\n  - repo: octo/tool\n    version: 1.0.0\n").unwrap();
        assert_eq!(config.tools.len(), 1);
        assert_eq!(config.options, ToolsetOptions::default());
        assert_eq!(config.options.keep_versions, 2);
        assert!(!config.options.auto_cleanup);
        assert!(config.options.cache_enabled);
        assert_eq!(config.options.cache_expiry, 3600);
    }

    #[test]
    fn test_partial_options_keep_given_values() {
        let config = parse_config("options:\n  keep_versions: 5\n").unwrap();
        assert!(config.tools.is_empty());
        assert_eq!(config.options.keep_versions, 5);
        assert!(config.options.cache_enabled);
    }

    #[test]
    fn test_zero_keep_versions_is_raised_to_one() {
        let config = parse_config("options:\n  keep_versions: 0\n").unwrap();
        assert_eq!(config.options.keep_versions, 1);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(parse_config("").unwrap(), ToolsetConfig::default());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        assert!(matches!(
            parse_config("tools: [unclosed"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("not found")));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = create_default_config(&path).unwrap();
        assert!(create_default_config(&path).is_err());

        config.tools.push(ToolConfig {
            repo: "octo/tool".to_string(),
            version: "2.0.0".to_string(),
            install_path: Some("/tmp/tool".to_string()),
        });
        save_config(&config, &path).unwrap();

        let reloaded = load_config(&path).unwrap();
        assert_eq!(reloaded.find_tool("octo/tool"), config.find_tool("octo/tool"));
    }

    #[test]
    fn test_default_install_root_uses_short_name() {
        let tool = ToolConfig {
            repo: "jesseduffield/lazygit".to_string(),
            version: String::new(),
            install_path: None,
        };
        assert_eq!(tool.install_root(), PathBuf::from("/opt/lazygit"));
    }
}
