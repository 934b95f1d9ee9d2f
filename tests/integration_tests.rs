mod common;

use common::TestContext;
use std::fs;

fn tool_config(ctx: &TestContext, version: &str, keep_versions: usize) -> String {
    format!(
        "tools:\n  - repo: octo/tool\n    version: {}\n    install_path: {}\noptions:\n  keep_versions: {}\n",
        version,
        ctx.install_root("tool").display(),
        keep_versions
    )
}

#[test]
fn test_help_and_version() {
    let ctx = TestContext::new();

    ctx.run(&["--help"])
        .assert_success()
        .assert_stdout_contains("Versioned installs of CLI tools from GitHub Releases")
        .assert_stdout_contains("Usage: toolset");

    ctx.run(&["version"])
        .assert_success()
        .assert_stdout_contains("toolset ");
}

#[test]
fn test_init_writes_default_config_once() {
    let ctx = TestContext::new();

    ctx.run(&["init"])
        .assert_success()
        .assert_stdout_contains("Created configuration");

    let content = ctx.read_config();
    let doc: serde_yaml::Value = serde_yaml::from_str(&content).expect("Config was not valid YAML");
    assert_eq!(doc["options"]["keep_versions"].as_u64(), Some(2));
    assert_eq!(doc["options"]["cache_enabled"].as_bool(), Some(true));

    ctx.run(&["init"])
        .assert_failure()
        .assert_stderr_contains("already exists");
}

#[test]
fn test_missing_config_hints_at_init() {
    let ctx = TestContext::new();

    ctx.run(&["list"])
        .assert_failure()
        .assert_stderr_contains("toolset init");
}

#[test]
fn test_list_without_network() {
    let ctx = TestContext::new();
    ctx.write_config(&tool_config(&ctx, "2.0.0", 2));
    ctx.install_versions(&ctx.install_root("tool"), &["1.0.0", "2.0.0"], "2.0.0");

    ctx.run(&["--no-cache", "list"])
        .assert_success()
        .assert_stdout_contains("octo/tool (v2.0.0) [installed]")
        .assert_stdout_contains("Current:   2.0.0")
        .assert_stdout_contains("Available: 2.0.0, 1.0.0")
        .assert_stdout_contains("Latest:    unknown");
}

#[test]
fn test_rollback_and_history() {
    let ctx = TestContext::new();
    let root = ctx.install_root("tool");
    ctx.write_config(&tool_config(&ctx, "2.0.0", 2));
    ctx.install_versions(&root, &["1.0.0", "2.0.0"], "2.0.0");

    ctx.run(&["rollback", "octo/tool"])
        .assert_success()
        .assert_stdout_contains("Rolled back octo/tool from 2.0.0 to 1.0.0");

    assert_eq!(
        fs::read_to_string(root.join("current").join("bin").join("tool")).unwrap(),
        "1.0.0"
    );
    assert!(ctx.read_config().contains("version: 1.0.0"));

    ctx.run(&["rollback", "octo/tool"])
        .assert_failure()
        .assert_stderr_contains("no older version");

    let history = ctx.run(&["history"]);
    history
        .assert_success()
        .assert_stdout_contains("SUCCESS | ROLLBACK | octo/tool | Rolled back from 2.0.0 to 1.0.0")
        .assert_stdout_contains("FAILED | ROLLBACK | octo/tool");

    ctx.run(&["history", "--limit", "1"])
        .assert_success()
        .assert_stdout_contains("FAILED | ROLLBACK");
    let limited = ctx.run(&["history", "--limit", "1"]);
    assert!(!limited.stdout.contains("SUCCESS"));

    ctx.run(&["history", "clear"])
        .assert_success()
        .assert_stdout_contains("History cleared");
    ctx.run(&["history"])
        .assert_success()
        .assert_stdout_contains("No history entries.");
}

#[test]
fn test_clean_keeps_current() {
    let ctx = TestContext::new();
    let root = ctx.install_root("tool");
    ctx.write_config(&tool_config(&ctx, "2.0.0", 1));
    ctx.install_versions(&root, &["1.0.0", "2.0.0", "3.0.0"], "2.0.0");

    ctx.run(&["clean"])
        .assert_success()
        .assert_stdout_contains("octo/tool: removed 3.0.0, 1.0.0");

    assert!(root.join("2.0.0").is_dir());
    assert!(!root.join("1.0.0").exists());
    assert!(!root.join("3.0.0").exists());
    assert!(root.join("current").join("bin").join("tool").is_file());

    ctx.run(&["history"])
        .assert_success()
        .assert_stdout_contains("Cleaned old versions: removed 3.0.0, 1.0.0");
}

#[test]
fn test_remove_keeps_files() {
    let ctx = TestContext::new();
    let root = ctx.install_root("tool");
    ctx.write_config(&tool_config(&ctx, "1.0.0", 2));
    ctx.install_versions(&root, &["1.0.0"], "1.0.0");

    ctx.run(&["--yes", "remove", "octo/tool"])
        .assert_success()
        .assert_stdout_contains("Removed octo/tool");

    assert!(!ctx.read_config().contains("octo/tool"));
    assert!(root.join("1.0.0").is_dir());

    ctx.run(&["--yes", "remove", "octo/tool"])
        .assert_failure()
        .assert_stderr_contains("not in the configuration");
}

#[test]
fn test_add_records_failure_when_offline() {
    let ctx = TestContext::new();
    ctx.write_config("tools: []\n");

    ctx.run(&["--no-cache", "add", "octo/tool"])
        .assert_failure()
        .assert_stderr_contains("network error");
    assert!(!ctx.read_config().contains("octo/tool"));

    ctx.run(&["add", "not-a-repo"])
        .assert_failure()
        .assert_stderr_contains("owner/repo");

    ctx.run(&["history"])
        .assert_success()
        .assert_stdout_contains("FAILED | ADD | octo/tool");
}

#[test]
fn test_install_unknown_repo() {
    let ctx = TestContext::new();
    ctx.write_config("tools: []\n");

    ctx.run(&["install", "octo/missing"])
        .assert_failure()
        .assert_stderr_contains("not in the configuration");
}

#[test]
fn test_cache_info_and_clear() {
    let ctx = TestContext::new();

    ctx.run(&["cache", "info"])
        .assert_success()
        .assert_stdout_contains("No cache directory yet.");

    let downloads = ctx.cache_dir.join("downloads");
    fs::create_dir_all(&downloads).unwrap();
    fs::write(downloads.join("abc123"), vec![0u8; 2048]).unwrap();

    ctx.run(&["cache", "info"])
        .assert_success()
        .assert_stdout_contains("Downloads: 1 entries, 2.0 KB");

    ctx.run(&["cache", "clear"])
        .assert_success()
        .assert_stdout_contains("Cache cleared");
    assert!(!downloads.join("abc123").exists());
}
