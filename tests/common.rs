use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// An isolated environment for running the `toolset` binary. Config, cache
/// and history all live in a temporary directory, and the release API points
/// at a closed local port unless a test opts into the real one.
#[allow(dead_code)]
pub struct TestContext {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
    pub history_path: PathBuf,
    pub bin_path: PathBuf,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config").join("toolset.yaml");
        let cache_dir = temp_dir.path().join("cache");
        let history_path = temp_dir.path().join("history").join("history.json");
        let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_toolset"));

        Self {
            temp_dir,
            config_path,
            cache_dir,
            history_path,
            bin_path,
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Directory a test tool is installed under.
    pub fn install_root(&self, name: &str) -> PathBuf {
        self.root().join("opt").join(name)
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = self.cmd_online();
        cmd.env("TOOLSET_GITHUB_API", "http://127.0.0.1:9");
        cmd
    }

    pub fn cmd_online(&self) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.env("TOOLSET_CONFIG", &self.config_path);
        cmd.env("TOOLSET_CACHE_DIR", &self.cache_dir);
        cmd.env("TOOLSET_HISTORY_FILE", &self.history_path);
        cmd.env("HOME", self.root());
        cmd.env("XDG_CONFIG_HOME", self.root().join("xdg-config"));
        cmd.env("XDG_CACHE_HOME", self.root().join("xdg-cache"));
        cmd.env_remove("RUST_LOG");
        cmd
    }

    pub fn run(&self, args: &[&str]) -> CommandOutput {
        self.cmd()
            .args(args)
            .output()
            .expect("Failed to run toolset")
            .into()
    }

    pub fn write_config(&self, content: &str) {
        fs::create_dir_all(self.config_path.parent().unwrap()).unwrap();
        fs::write(&self.config_path, content).unwrap();
    }

    pub fn read_config(&self) -> String {
        fs::read_to_string(&self.config_path).expect("Failed to read config")
    }

    /// Lay out version directories under `root` and point `current` at
    /// `current`.
    pub fn install_versions(&self, root: &Path, versions: &[&str], current: &str) {
        for version in versions {
            let bin = root.join(version).join("bin");
            fs::create_dir_all(&bin).unwrap();
            fs::write(bin.join("tool"), version).unwrap();
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(root.join(current), root.join("current")).unwrap();
    }
}

#[allow(dead_code)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            status: output.status,
        }
    }
}

#[allow(dead_code)]
impl CommandOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.status.success() {
            panic!(
                "Command failed with status {:?}\nstdout: {}\nstderr: {}",
                self.status.code(),
                self.stdout,
                self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        if self.status.success() {
            panic!(
                "Command unexpectedly succeeded\nstdout: {}\nstderr: {}",
                self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_stdout_contains(&self, text: &str) -> &Self {
        assert!(
            self.stdout.contains(text),
            "Stdout did not contain '{}'\nActual stdout: {}",
            text,
            self.stdout
        );
        self
    }

    pub fn assert_stderr_contains(&self, text: &str) -> &Self {
        assert!(
            self.stderr.contains(text),
            "Stderr did not contain '{}'\nActual stderr: {}",
            text,
            self.stderr
        );
        self
    }
}
