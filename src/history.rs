//! Append-only audit log of mutating operations.
//!
//! The log is a JSON array rewritten wholesale on every append. Concurrent
//! invocations race and the last writer wins.

use crate::error::Result;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Remove,
    Update,
    Install,
    Rollback,
    Clean,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Add => "add",
            OperationKind::Remove => "remove",
            OperationKind::Update => "update",
            OperationKind::Install => "install",
            OperationKind::Rollback => "rollback",
            OperationKind::Clean => "clean",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: i64,
    pub date: String,
    pub operation: OperationKind,
    pub repos: Vec<String>,
    pub success: bool,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in file order. Unreadable logs are reported and treated
    /// as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        if !self.path.exists() {
            return Vec::new();
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(crate::error::Error::from)
            .and_then(|content| Ok(serde_json::from_str::<Vec<HistoryEntry>>(&content)?));
        match parsed {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to load history from {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save(&self, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }

    /// Record an operation. The entry is returned even if persisting it
    /// failed; that failure is logged, never propagated.
    pub fn append(
        &self,
        operation: OperationKind,
        repos: &[&str],
        details: Map<String, Value>,
        success: bool,
    ) -> HistoryEntry {
        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now().timestamp(),
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            operation,
            repos: repos.iter().map(|r| r.to_string()).collect(),
            success,
            details,
        };

        let mut entries = self.load();
        entries.push(entry.clone());
        if let Err(e) = self.save(&entries) {
            tracing::warn!("Failed to save history to {}: {}", self.path.display(), e);
        }
        entry
    }

    /// Entries newest first, optionally truncated to `limit`.
    pub fn query(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let mut entries = self.load();
        // Reverse first so entries sharing a timestamp also come newest first
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        entries
    }

    /// Delete the log. Returns `false` when there was nothing to delete.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}

fn detail_str<'a>(details: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    details.get(key).and_then(Value::as_str)
}

pub fn format_entry(entry: &HistoryEntry) -> String {
    let d = &entry.details;
    let transition = detail_str(d, "from_version").zip(detail_str(d, "to_version"));

    let action = match entry.operation {
        OperationKind::Add => "Added repo(s) to configuration".to_string(),
        OperationKind::Remove => "Removed repo(s) from configuration".to_string(),
        OperationKind::Update => match transition {
            Some((from, to)) => format!("Updated from {} to {}", from, to),
            None => "Updated repo(s)".to_string(),
        },
        OperationKind::Install => match detail_str(d, "version") {
            Some(version) => format!("Installed version {}", version),
            None => "Installed version".to_string(),
        },
        OperationKind::Rollback => match transition {
            Some((from, to)) => format!("Rolled back from {} to {}", from, to),
            None => "Rolled back".to_string(),
        },
        OperationKind::Clean => match d.get("removed_versions").and_then(Value::as_array) {
            Some(removed) => {
                let names: Vec<&str> = removed.iter().filter_map(Value::as_str).collect();
                let removed = if names.is_empty() {
                    "none".to_string()
                } else {
                    names.join(", ")
                };
                format!("Cleaned old versions: removed {}", removed)
            }
            None => "Cleaned old versions".to_string(),
        },
    };

    let status = if entry.success { "SUCCESS" } else { "FAILED" };
    let mut line = format!(
        "{} | {} | {} | {} | {}",
        entry.date,
        status,
        entry.operation.to_string().to_uppercase(),
        entry.repos.join(", "),
        action
    );
    if !entry.success {
        if let Some(reason) = detail_str(d, "reason").or_else(|| detail_str(d, "error")) {
            line.push_str(&format!(" ({})", reason));
        }
    }
    line
}

/// Build a details map from `key => value` pairs.
#[macro_export]
macro_rules! details {
    ($($key:literal => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = serde_json::Map::new();
        $(map.insert($key.to_string(), serde_json::json!($value));)*
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_query_newest_first() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history").join("history.json"));

        let first = log.append(
            OperationKind::Add,
            &["octo/tool"],
            details! {"version" => "1.0.0"},
            true,
        );
        let second = log.append(
            OperationKind::Install,
            &["octo/tool"],
            details! {"version" => "1.0.0", "reason" => "boom"},
            false,
        );
        assert_ne!(first.id, second.id);

        let entries = log.query(None);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, second.id);
        assert_eq!(entries[1].id, first.id);

        let limited = log.query(Some(1));
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, second.id);
    }

    #[test]
    fn test_entries_serialize_with_lowercase_operation() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.json"));
        log.append(OperationKind::Rollback, &["a/b"], Map::new(), true);

        let raw = fs::read_to_string(log.path()).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["operation"], "rollback");
        assert_eq!(value[0]["repos"][0], "a/b");
    }

    #[test]
    fn test_corrupt_log_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "not json").unwrap();
        let log = HistoryLog::new(&path);
        assert!(log.load().is_empty());

        log.append(OperationKind::Clean, &["a/b"], Map::new(), true);
        assert_eq!(log.load().len(), 1);
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("history.json"));
        assert!(!log.clear().unwrap());
        log.append(OperationKind::Add, &["a/b"], Map::new(), true);
        assert!(log.clear().unwrap());
        assert!(log.query(None).is_empty());
    }

    #[test]
    fn test_format_entry() {
        let entry = HistoryEntry {
            id: "x".to_string(),
            timestamp: 0,
            date: "2024-01-01 00:00:00".to_string(),
            operation: OperationKind::Update,
            repos: vec!["octo/tool".to_string()],
            success: true,
            details: details! {"from_version" => "2.0.0", "to_version" => "2.1.0"},
        };
        assert_eq!(
            format_entry(&entry),
            "2024-01-01 00:00:00 | SUCCESS | UPDATE | octo/tool | Updated from 2.0.0 to 2.1.0"
        );

        let clean = HistoryEntry {
            operation: OperationKind::Clean,
            success: false,
            details: details! {"removed_versions" => Vec::<String>::new(), "error" => "denied"},
            ..entry
        };
        assert_eq!(
            format_entry(&clean),
            "2024-01-01 00:00:00 | FAILED | CLEAN | octo/tool | Cleaned old versions: removed none (denied)"
        );
    }
}
