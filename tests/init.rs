use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "refdelta init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".refdelta.toml");
    assert!(config_path.exists(), ".refdelta.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[gitlab]"));
    assert!(content.contains("[delta]"));

    // The template must load with the same parser the CLI uses.
    let config = refdelta_core::DeltaConfig::from_toml(&content).unwrap();
    assert_eq!(config.scan.mode, refdelta_core::ScanMode::AutoDiscover);
    assert_eq!(config.delta.concurrency, 4);
    let _raw: toml::Value = toml::from_str(&content).unwrap();
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".refdelta.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let existing = std::fs::read_to_string(dir.path().join(".refdelta.toml")).unwrap();
    assert_eq!(existing, "# existing");
}

#[test]
fn delta_without_configuration_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .args(["delta", "--base", "v1.0.0", "--target", "v2.0.0"])
        .current_dir(dir.path())
        .env_remove("GITLAB_URL")
        .env_remove("GITLAB_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("base_url"), "unexpected stderr: {stderr}");
}

#[test]
fn delta_rejects_malformed_dates_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(".refdelta.toml"),
        "[gitlab]\nbase_url = \"http://127.0.0.1:9\"\nprivate_token = \"t\"\n\n[groups]\nby_path = [\"platform\"]\n",
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .args(["delta", "--base", "v1", "--target", "v2"])
        .args(["--after", "yesterday"])
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("yesterday"), "unexpected stderr: {stderr}");
}

#[test]
fn find_requires_commits_or_sha() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .arg("find")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--commits"), "unexpected stderr: {stderr}");
}

#[test]
fn find_reports_missing_commit_list() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .args(["find", "--commits", "hotfixes.txt"])
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("hotfixes.txt"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn find_with_blank_commit_list_fails_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hotfixes.txt"), "\n# nothing yet\n\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_refdelta"))
        .args(["find", "--commits", "hotfixes.txt"])
        .current_dir(dir.path())
        .env_remove("GITLAB_URL")
        .env_remove("GITLAB_TOKEN")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("no commit hashes"),
        "unexpected stderr: {stderr}"
    );
}
