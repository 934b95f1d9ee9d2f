//! Privilege escalation for filesystem changes under protected paths.
//!
//! Every helper on [`Privileged`] first attempts the operation directly and
//! only hands it to the [`Escalator`] when the OS denies permission.

use crate::error::{Error, Result};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;
use walkdir::WalkDir;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs argv commands with elevated rights.
pub trait Escalator {
    /// Run `argv` elevated and wait for it. A nonzero exit is an error.
    fn run(&self, argv: &[OsString]) -> Result<()>;

    /// Whether escalation is available without an interactive password.
    fn probe(&self) -> bool;
}

pub struct SudoEscalator;

impl Escalator for SudoEscalator {
    fn run(&self, argv: &[OsString]) -> Result<()> {
        let rendered = render(argv);
        tracing::debug!("sudo {}", rendered);

        let status = Command::new("sudo").args(argv).status().map_err(|e| {
            Error::Permission(format!("privilege escalation unavailable: {}", e))
        })?;

        if !status.success() {
            return Err(Error::Permission(format!(
                "elevated command failed ({}): {}",
                status, rendered
            )));
        }
        Ok(())
    }

    fn probe(&self) -> bool {
        let child = Command::new("sudo")
            .args(["-n", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::debug!("sudo not available: {}", e);
                return false;
            }
        };

        match child.wait_timeout(PROBE_TIMEOUT) {
            Ok(Some(status)) => status.success(),
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::debug!("sudo probe timed out after {:?}", PROBE_TIMEOUT);
                false
            }
            Err(e) => {
                tracing::debug!("sudo probe failed: {}", e);
                false
            }
        }
    }
}

fn render(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn argv<const N: usize>(parts: [&OsStr; N]) -> Vec<OsString> {
    parts.iter().map(|p| p.to_os_string()).collect()
}

fn is_denied(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

/// Whether files can be created in `dir` (or, if it does not exist yet, in
/// its nearest existing ancestor).
pub fn is_writable(dir: &Path) -> bool {
    let existing = dir.ancestors().find(|p| p.is_dir());
    match existing {
        Some(existing) => tempfile::Builder::new()
            .prefix(".toolset-probe")
            .tempfile_in(existing)
            .is_ok(),
        None => false,
    }
}

pub struct Privileged<'a> {
    escalator: &'a dyn Escalator,
}

impl<'a> Privileged<'a> {
    pub fn new(escalator: &'a dyn Escalator) -> Self {
        Self { escalator }
    }

    fn escalate(&self, reason: &io::Error, command: Vec<OsString>) -> Result<()> {
        tracing::info!(
            "Permission denied ({}); retrying with elevated rights: {}",
            reason,
            render(&command)
        );
        self.escalator.run(&command)
    }

    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        match fs::create_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if is_denied(&e) => {
                self.escalate(&e, argv([OsStr::new("mkdir"), OsStr::new("-p"), path.as_os_str()]))
            }
            Err(e) => Err(Error::from_fs("create directory", path, e)),
        }
    }

    /// Remove a file, symlink or directory tree. Symlinks are removed, never
    /// followed. A missing path is not an error.
    pub fn remove_path(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::from_fs("inspect", path, e)),
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if is_denied(&e) => {
                let flag = if meta.is_dir() { "-rf" } else { "-f" };
                self.escalate(&e, argv([OsStr::new("rm"), OsStr::new(flag), path.as_os_str()]))
            }
            Err(e) => Err(Error::from_fs("remove", path, e)),
        }
    }

    pub fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        match make_symlink(target, link) {
            Ok(()) => Ok(()),
            Err(e) if is_denied(&e) => self.escalate(
                &e,
                argv([OsStr::new("ln"), OsStr::new("-s"), target.as_os_str(), link.as_os_str()]),
            ),
            Err(e) => Err(Error::from_fs("create symlink", link, e)),
        }
    }

    /// Copy `src` (file or directory tree) to `dst`, replacing whatever is
    /// already at `dst`.
    pub fn replace_with_copy(&self, src: &Path, dst: &Path) -> Result<()> {
        let direct = remove_existing(dst).and_then(|()| copy_tree(src, dst));
        match direct {
            Ok(()) => Ok(()),
            Err(e) if is_denied(&e) => {
                let flag = if dst.is_dir() { "-rf" } else { "-f" };
                self.escalate(&e, argv([OsStr::new("rm"), OsStr::new(flag), dst.as_os_str()]))?;
                self.escalator.run(&argv([
                    OsStr::new("cp"),
                    OsStr::new("-R"),
                    src.as_os_str(),
                    dst.as_os_str(),
                ]))
            }
            Err(e) => Err(Error::from_fs("copy into", dst, e)),
        }
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub(crate) fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
    }
}

/// Recursively copy `src` to `dst`, preserving permissions and symlinks.
pub(crate) fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            make_symlink(&link_target, &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
