//! End-to-end tests for the watchhamster binary

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn watchhamster(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_watchhamster"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run watchhamster")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("watchhamster.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_business_day_holiday() {
    let output = watchhamster(&["business-day", "20250101"]);
    assert!(output.status.success(), "{:?}", output);

    let info: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(info["is_holiday"], true);
    assert_eq!(info["is_business_day"], false);
    assert_eq!(info["next_business_day"], "2025-01-02");
}

#[test]
fn test_business_day_uses_configured_holidays() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
calendar:
  holidays:
    - date: "2026-10-19"
      name: Company holiday
"#,
    );

    let output = watchhamster(&[
        "business-day",
        "2026-10-19",
        "--config",
        config.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{:?}", output);
    let info: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(info["holiday_name"], "Company holiday");
    assert_eq!(info["is_business_day"], false);
}

#[test]
fn test_business_day_rejects_bad_date() {
    let output = watchhamster(&["business-day", "2025-13-45"]);
    assert!(!output.status.success());
}

#[test]
fn test_compare_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    fs::create_dir_all(&data).unwrap();
    // Wednesday and the previous business day
    fs::write(
        data.join("20250305.json"),
        r#"{"news_items": {"kospi-close": {"title": "KOSPI closes higher", "status": "published", "delay_minutes": 5, "is_latest": true}}}"#,
    )
    .unwrap();
    fs::write(
        data.join("20250304.json"),
        r#"{"news_items": {"kospi-close": {"title": "KOSPI closes lower", "status": "published", "delay_minutes": 45, "is_latest": true}}}"#,
    )
    .unwrap();

    let reports = dir.path().join("reports");
    let output = watchhamster(&[
        "compare",
        "--data-dir",
        data.to_str().unwrap(),
        "--date",
        "20250305",
        "--output",
        reports.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{:?}", output);
    assert!(stdout(&output).contains("Comparison for 20250305"));

    let report_path = reports.join("comparison_report_20250305.json");
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(report_path).unwrap()).unwrap();
    let results = report["comparison_results"].as_array().unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0]["has_improvement"], true);
}

#[test]
fn test_compare_without_current_data_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = watchhamster(&[
        "compare",
        "--data-dir",
        dir.path().to_str().unwrap(),
        "--date",
        "20250305",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_backup_create_verify_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("app");
    fs::create_dir_all(base.join("config")).unwrap();
    let webhooks = base.join("config/webhooks.json");
    fs::write(&webhooks, r#"{"url": "https://hooks.example.com/original"}"#).unwrap();

    let config = write_config(
        dir.path(),
        &format!(
            r#"
backup:
  root: "{}"
  base_dir: "{}"
  tracked_files: [config/webhooks.json]
"#,
            dir.path().join("backups").display(),
            base.display()
        ),
    );
    let config = config.to_str().unwrap();

    let output = watchhamster(&["backup", "--config", config, "create", "before-change"]);
    assert!(output.status.success(), "{:?}", output);
    let backup_id = stdout(&output).trim().to_string();
    assert!(!backup_id.is_empty());

    let output = watchhamster(&["backup", "--config", config, "verify", &backup_id]);
    assert!(output.status.success(), "{:?}", output);

    fs::write(&webhooks, r#"{"url": "https://hooks.example.com/broken"}"#).unwrap();
    let output = watchhamster(&["backup", "--config", config, "rollback", &backup_id]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        fs::read_to_string(&webhooks).unwrap(),
        r#"{"url": "https://hooks.example.com/original"}"#
    );

    let output = watchhamster(&["backup", "--config", config, "status"]);
    assert!(output.status.success(), "{:?}", output);
    let status: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(status["rollback_count"], 1);
}

#[test]
fn test_backup_rollback_from_tampered_copy_fails() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("app");
    fs::create_dir_all(&base).unwrap();
    fs::write(base.join("webhooks.json"), "original").unwrap();

    let backups = dir.path().join("backups");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
backup:
  root: "{}"
  base_dir: "{}"
  tracked_files: [webhooks.json]
"#,
            backups.display(),
            base.display()
        ),
    );
    let config = config.to_str().unwrap();

    let output = watchhamster(&["backup", "--config", config, "create", "stable"]);
    assert!(output.status.success(), "{:?}", output);
    let backup_id = stdout(&output).trim().to_string();
    fs::write(backups.join(&backup_id).join("webhooks.json"), "tampered").unwrap();

    let output = watchhamster(&["backup", "--config", config, "rollback", &backup_id]);
    assert!(!output.status.success());
    assert!(stdout(&output).is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Checksum mismatch"));
}

#[test]
fn test_backup_requires_section() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}");
    let output = watchhamster(&["backup", "--config", config.to_str().unwrap(), "list"]);
    assert!(!output.status.success());
}

#[test]
fn test_notify_test_requires_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}");
    let output = watchhamster(&["notify-test", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn test_run_for_duration_saves_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state.json");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
watchhamster:
  state_file: "{}"
  mode: integrated
supervision:
  startup_settle: 50ms
monitors:
  - id: local-probe
    probe:
      endpoint: http://127.0.0.1:9/health
      interval: 2s
      timeout: 500ms
"#,
            state.display()
        ),
    );

    let output = watchhamster(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--run-duration",
        "1",
    ]);
    assert!(output.status.success(), "{:?}", output);

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state).unwrap()).unwrap();
    assert_eq!(saved["watchhamster_running"], false);
    assert_eq!(saved["mode"], "integrated");
}

#[test]
fn test_run_rejects_unknown_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}");
    let output = watchhamster(&[
        "run",
        "--config",
        config.to_str().unwrap(),
        "--mode",
        "turbo",
    ]);
    assert!(!output.status.success());
}
