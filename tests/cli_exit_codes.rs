// tests/cli_exit_codes.rs

use std::process::Command;

use procwatch::errors::exit_code;

fn procwatch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_procwatch"))
}

#[test]
fn unreadable_config_is_not_reported_as_unit_not_found() {
    let output = procwatch()
        .args(["--config", "/definitely/not/here/Procwatch.toml", "run", "--dry-run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(exit_code::CONTROL_ERROR));
}

#[test]
fn dry_run_of_the_demo_config_succeeds() {
    let config = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/Procwatch.toml");
    let output = procwatch()
        .args(["--config", config, "run", "--dry-run"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(exit_code::SUCCESS));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("cmd: cargo run --release"), "{stdout}");
}

#[cfg(unix)]
#[test]
fn client_without_a_daemon_reports_a_control_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("Procwatch.toml");
    std::fs::write(&config, "[app.svc]\ncmd = \"true\"\n").unwrap();

    let output = procwatch()
        .arg("--config")
        .arg(&config)
        .args(["status", "svc"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(exit_code::CONTROL_ERROR));
}
