//! Binary surface tests for workmon_agent: flags, exit codes, demo runs.
use assert_cmd::Command;
use std::path::Path;

fn agent(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_workmon_agent"));
    // keep the user's real config file out of the picture
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("WORKMON_AGENT_TIMEOUT_SECS")
        .env_remove("WORKMON_AGENT_FAILURE_THRESHOLD")
        .env_remove("WORKMON_AGENT_CHECKPOINT_EVERY")
        .env_remove("WORKMON_PASSWORD");
    cmd
}

#[test]
fn help_short_and_long() {
    let dir = tempfile::tempdir().unwrap();
    for flag in ["-h", "--help"] {
        let out = agent(dir.path()).arg(flag).output().unwrap();
        assert!(out.status.success());
        assert!(String::from_utf8_lossy(&out.stdout).contains("Usage: workmon_agent"));
    }
}

#[test]
fn bad_arguments_exit_with_setup_code() {
    let dir = tempfile::tempdir().unwrap();
    agent(dir.path()).arg("--bogus").assert().code(2);
    agent(dir.path()).args(["--demo", "--interval", "often"]).assert().code(2);
    // no target and no --demo
    agent(dir.path()).assert().code(2);
    // credentialed mode without a password
    agent(dir.path())
        .args(["-T", "ws://127.0.0.1:9/ws", "-u", "monitor"])
        .assert()
        .code(2);
}

#[test]
fn malformed_config_file_is_a_setup_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg_dir = dir.path().join("workmon_agent");
    std::fs::create_dir_all(&cfg_dir).unwrap();
    std::fs::write(cfg_dir.join("config.json"), "{ timeout_secs: ").unwrap();
    agent(dir.path()).args(["--demo", "--check"]).assert().code(2);
}

#[test]
fn demo_session_completes_and_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("run.json");
    agent(dir.path())
        .args(["--demo", "--duration", "1", "--interval=60", "-o"])
        .arg(&output)
        .assert()
        .success();

    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(doc["metadata"]["total_samples"], 1);
    assert_eq!(doc["metadata"]["target"], "demo");
    assert_eq!(doc["samples"].as_array().unwrap().len(), 1);

    let cp: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("run_checkpoint.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(cp["status"], "COMPLETED");

    // finished checkpoints are not restarted implicitly
    agent(dir.path())
        .args(["--demo", "-d", "1", "-i", "60", "-o"])
        .arg(&output)
        .assert()
        .code(2);
    agent(dir.path())
        .args(["--demo", "-d", "1", "-i", "60", "--discard-checkpoint", "-o"])
        .arg(&output)
        .assert()
        .success();
}

#[test]
fn corrupt_checkpoint_is_reported_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let cp = dir.path().join("broken_checkpoint.json");
    std::fs::write(&cp, b"{\"version\": \"0.1").unwrap();
    agent(dir.path())
        .args(["--demo", "-d", "1", "-i", "60", "--resume-from"])
        .arg(&cp)
        .arg("-o")
        .arg(dir.path().join("out.json"))
        .assert()
        .code(2);
    assert_eq!(std::fs::read(&cp).unwrap(), b"{\"version\": \"0.1");
}

#[test]
fn preflight_against_demo_succeeds_and_unreachable_fails() {
    let dir = tempfile::tempdir().unwrap();
    agent(dir.path())
        .current_dir(dir.path())
        .args(["--demo", "--check"])
        .assert()
        .success();
    assert!(!dir.path().join("workload_samples_checkpoint.json").exists());

    // port 9 (discard) is closed on test machines
    agent(dir.path())
        .args(["--check", "--timeout", "5", "-T", "ws://127.0.0.1:9/ws"])
        .assert()
        .code(1);
}
