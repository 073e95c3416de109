// tests/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use procwatch::config::{load_and_validate, load_settings};
use procwatch::errors::ProcwatchError;
use tempfile::NamedTempFile;

#[test]
fn demo_config_loads() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join("Procwatch.toml");
    let cfg = load_and_validate(&path).unwrap();

    let hbp = cfg.unit("hbp").expect("demo defines hbp");
    assert_eq!(hbp.spec.command_line(), "cargo run --release");
    assert!(hbp.spec.autorestart);

    let watch = hbp.watch.as_ref().expect("hbp is watched");
    assert_eq!(watch.ignore(), &["target".to_string()]);
    assert!(!watch.follow_symlinks());
    assert!(cfg.rejected().is_empty());
}

#[test]
fn relative_paths_resolve_against_the_config_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procwatch.toml");
    std::fs::write(
        &path,
        r#"
[config]
control_socket = "run/ctl.sock"
debounce = "50ms"

[app.api]
cmd = "./api"
cwd = "services/api"
watch = true
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.base_dir(), dir.path());
    assert_eq!(cfg.settings().control_socket, dir.path().join("run/ctl.sock"));

    let api = cfg.unit("api").unwrap();
    assert_eq!(api.spec.cwd, Some(dir.path().join("services/api")));
    let watch = api.watch.as_ref().unwrap();
    assert_eq!(watch.roots(), &[dir.path().join("services/api")]);
    assert_eq!(watch.debounce(), Duration::from_millis(50));

    let settings = load_settings(&path).unwrap();
    assert_eq!(settings.control_socket, cfg.settings().control_socket);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Procwatch.toml").unwrap_err();
    assert!(matches!(err, ProcwatchError::IoError(_)), "got {err:?}");
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[app.svc\ncmd = ").unwrap();

    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, ProcwatchError::TomlError(_)), "got {err:?}");
}

#[test]
fn app_without_cmd_is_rejected_without_losing_the_others() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[app.good]
cmd = "echo"

[app.bad]
watch = true
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.units().len(), 1);
    assert!(cfg.unit("good").is_some());
    let reason = cfg.rejected().get("bad").unwrap();
    assert!(reason.contains("cmd"), "{reason}");
}

#[test]
fn builder_apps_survive_the_toml_round_trip() {
    use procwatch_test_utils::builders::{AppConfigBuilder, ConfigFileBuilder};

    let cfg = ConfigFileBuilder::new()
        .base_dir("/srv")
        .with_app(
            "api",
            AppConfigBuilder::new("./api")
                .args(&["--port", "8080"])
                .env("RUST_LOG", "debug")
                .stop_timeout("2s")
                .build(),
        )
        .build();

    let api = cfg.unit("api").unwrap();
    assert_eq!(api.spec.command_line(), "./api --port 8080");
    assert_eq!(api.spec.env.get("RUST_LOG").map(String::as_str), Some("debug"));
    assert_eq!(api.spec.stop_timeout, Duration::from_secs(2));
    assert!(api.spec.cwd.is_none());
}

#[test]
fn bad_unit_is_listed_as_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[app.good]
cmd = "echo"

[app.bad]
cmd = "echo"
stop_timeout = "whenever"
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.units().len(), 1);
    let reason = cfg.rejected().get("bad").unwrap();
    assert!(reason.contains("stop_timeout"), "{reason}");
}
