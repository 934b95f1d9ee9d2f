mod common;

#[cfg(feature = "e2e")]
use common::TestContext;

#[test]
#[cfg(all(feature = "e2e", target_os = "linux", target_arch = "x86_64"))]
fn e2e_add_install_fzf() {
    let ctx = TestContext::new();
    ctx.write_config("tools: []\n");
    let root = ctx.install_root("fzf");
    let root_str = root.display().to_string();

    ctx.cmd_online()
        .args(["add", "junegunn/fzf", "--install-path", &root_str, "--install"])
        .output()
        .map(common::CommandOutput::from)
        .expect("Failed to run toolset")
        .assert_success()
        .assert_stdout_contains("junegunn/fzf installed at version");

    assert!(root.join("current").join("fzf").is_file());

    let output: common::CommandOutput = ctx
        .cmd_online()
        .args(["install", "junegunn/fzf"])
        .output()
        .expect("Failed to run toolset")
        .into();
    output.assert_success().assert_stdout_contains("is up to date");

    // A second run is served from the API cache
    assert!(ctx.cache_dir.join("api").is_dir());
}

#[test]
#[cfg(all(feature = "e2e", target_os = "linux"))]
fn e2e_add_unknown_repository() {
    let ctx = TestContext::new();
    ctx.write_config("tools: []\n");

    let output: common::CommandOutput = ctx
        .cmd_online()
        .args(["add", "octo-org-that-does-not-exist/nope"])
        .output()
        .expect("Failed to run toolset")
        .into();
    output.assert_failure().assert_stderr_contains("not found");
}
