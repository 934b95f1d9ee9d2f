//! Versioned install directories and the `current` symlink.

use crate::error::{Error, Result};
use crate::privilege::{make_symlink, Privileged};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::Path;

pub const CURRENT_LINK: &str = "current";
const CURRENT_LINK_TMP: &str = ".current.tmp";

/// Split into alternating text and digit runs, starting with a (possibly
/// empty) text run.
fn runs(s: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_digits = false;
    for (i, c) in s.char_indices() {
        if c.is_ascii_digit() != in_digits {
            runs.push(&s[start..i]);
            start = i;
            in_digits = !in_digits;
        }
    }
    runs.push(&s[start..]);
    runs
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}

/// Natural version order: digit runs compare numerically, text runs
/// case-insensitively, so `2.10.0 > 2.9.0`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ra, rb) = (runs(a), runs(b));
    for (i, (x, y)) in ra.iter().zip(rb.iter()).enumerate() {
        let ord = if i % 2 == 1 {
            cmp_numeric(x, y)
        } else {
            x.to_lowercase().cmp(&y.to_lowercase())
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ra.len().cmp(&rb.len()).then_with(|| a.cmp(b))
}

pub fn sort_versions_desc(versions: &mut [String]) {
    versions.sort_by(|a, b| natural_cmp(b, a));
}

/// Version directories under `root`, newest first. Symlinks and the
/// `current` entry are never versions.
pub fn installed_versions(root: &Path) -> Result<Vec<String>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::NotFound(format!(
                "install directory {} does not exist",
                root.display()
            )))
        }
        Err(e) => return Err(Error::from_fs("read", root, e)),
    };

    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == CURRENT_LINK || name == CURRENT_LINK_TMP {
            continue;
        }
        if entry.file_type()?.is_dir() {
            versions.push(name);
        }
    }
    sort_versions_desc(&mut versions);
    Ok(versions)
}

/// Version name the `current` link under `root` points at, if any.
pub fn current_version(root: &Path) -> Option<String> {
    let target = fs::read_link(root.join(CURRENT_LINK)).ok()?;
    target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Point `link` at `target`, replacing whatever is there.
pub fn publish(target: &Path, link: &Path, privileged: &Privileged) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(meta) if !meta.file_type().is_symlink() => {
            tracing::warn!("Replacing non-symlink at {}", link.display());
            privileged.remove_path(link)?;
        }
        _ => {}
    }

    let staged = link.with_file_name(CURRENT_LINK_TMP);
    let direct = fs::remove_file(&staged)
        .or_else(|e| match e.kind() {
            io::ErrorKind::NotFound => Ok(()),
            _ => Err(e),
        })
        .and_then(|()| make_symlink(target, &staged))
        .and_then(|()| fs::rename(&staged, link));

    match direct {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            tracing::debug!("Direct symlink swap denied: {}", e);
            privileged.remove_path(link)?;
            privileged.symlink(target, link)?;
        }
        Err(e) => {
            let _ = fs::remove_file(&staged);
            return Err(Error::from_fs("publish", link, e));
        }
    }

    tracing::info!("{} -> {}", link.display(), target.display());
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetainReport {
    pub kept: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

/// Keep `current` plus the next `keep - 1` newest versions; delete the rest.
/// `current` counts toward `keep` even when its directory is missing, and the
/// version the `current` link targets is never deleted. A failed deletion is
/// reported and does not stop the others.
pub fn retain(
    root: &Path,
    current: &str,
    keep: usize,
    privileged: &Privileged,
) -> Result<RetainReport> {
    let versions = installed_versions(root)?;
    let keep = keep.max(1);
    tracing::info!(
        "Cleaning old versions in {} (keeping {} most recent)",
        root.display(),
        keep
    );

    let linked = current_version(root);
    if let Some(linked) = linked.as_deref().filter(|l| *l != current) {
        tracing::warn!(
            "{} points at {} but the configured version is {}; keeping both",
            root.join(CURRENT_LINK).display(),
            linked,
            current
        );
    }
    let protected = |v: &str| v == current || linked.as_deref() == Some(v);

    let mut report = RetainReport::default();
    report
        .kept
        .extend(versions.iter().filter(|v| protected(v.as_str())).cloned());

    let mut budget = keep - 1;
    for version in versions.into_iter().filter(|v| !protected(v.as_str())) {
        if budget > 0 {
            budget -= 1;
            report.kept.push(version);
            continue;
        }
        tracing::info!("Removing old version: {}", version);
        match privileged.remove_path(&root.join(&version)) {
            Ok(()) => report.removed.push(version),
            Err(e) => {
                tracing::warn!("Failed to remove {}: {}", root.join(&version).display(), e);
                report.failed.push(version);
            }
        }
    }
    Ok(report)
}

/// The version a rollback from `current` should land on, given installed
/// versions newest first.
pub fn rollback_target(versions: &[String], current: &str, repo: &str) -> Result<String> {
    if versions.is_empty() {
        return Err(Error::NotFound(format!(
            "no installed versions found for {}",
            repo
        )));
    }

    let no_older = || Error::NoOlderVersion {
        repo: repo.to_string(),
        current: current.to_string(),
    };

    match versions.iter().position(|v| v == current) {
        Some(idx) => versions.get(idx + 1).cloned().ok_or_else(no_older),
        None if versions.len() < 2 => Err(no_older()),
        None => {
            tracing::warn!(
                "Current version {} of {} is not installed; using {}",
                current,
                repo,
                versions[1]
            );
            Ok(versions[1].clone())
        }
    }
}
