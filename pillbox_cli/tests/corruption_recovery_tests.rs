//! Corruption recovery tests for pillbox.
//!
//! These tests verify the system can handle:
//! - Corrupted or partially written log journals
//! - Corrupted medication files
//! - Missing and empty files

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write as IoWrite;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pillbox"))
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_corrupted_journal_lines_ignored() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .args(["add", "Aspirin", "100mg"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    fs::write(
        data_dir.join("logs.jsonl"),
        "{ invalid json }\n{ more invalid }\n",
    )
    .expect("Failed to write corrupted journal");

    cli()
        .arg("today")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("0/1"));

    // New doses still append after the damage
    cli()
        .args(["take", "Aspirin"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    cli()
        .arg("today")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1"));
}

#[test]
fn test_partial_journal_line() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    cli()
        .args(["add", "Aspirin", "100mg"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();
    cli()
        .args(["take", "Aspirin"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    // Partial last line (simulating a crash during write)
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(data_dir.join("logs.jsonl"))
        .unwrap();
    write!(file, r#"{{"id":"partial"#).unwrap();
    drop(file);

    cli()
        .arg("today")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("1/1"));
}

#[test]
fn test_corrupted_medications_file_fails() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("medications.json"), "{ invalid json }}}}")
        .expect("Failed to write corrupted medications");

    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));

    // Writes refuse to clobber the unreadable file
    cli()
        .args(["add", "Aspirin", "100mg"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure();

    let contents = fs::read_to_string(data_dir.join("medications.json")).unwrap();
    assert_eq!(contents, "{ invalid json }}}}");
}

#[test]
fn test_legacy_medication_record() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    // Records written before interval scheduling and display fields existed
    fs::write(
        data_dir.join("medications.json"),
        r#"[{"id":"6f1c2f5e-0b8e-4d52-9a34-3f8a1f0e2b11","name":"Aspirin","dosage":"100mg","times_per_day":1,"created_at":"2024-01-01T00:00:00Z"}]"#,
    )
    .unwrap();

    cli()
        .arg("list")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Aspirin (100mg)  1x/day  [cyan pill]"));
}

#[test]
fn test_empty_files() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    fs::write(data_dir.join("logs.jsonl"), "").unwrap();

    cli()
        .arg("stats")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Weekly average: 0%"));
}

#[test]
fn test_missing_data_dir_is_created() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("nested/pillbox");

    cli()
        .args(["add", "Aspirin", "100mg"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    assert!(data_dir.join("medications.json").exists());
}

#[test]
#[cfg(target_os = "linux")]
fn test_malformed_config_only_blocks_remind() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().join("data");
    let config_home = temp_dir.path().join("config");
    fs::create_dir_all(config_home.join("pillbox")).unwrap();
    fs::write(config_home.join("pillbox/config.toml"), "[reminders\nmorning = ").unwrap();

    cli()
        .env("XDG_CONFIG_HOME", &config_home)
        .args(["add", "Aspirin", "100mg"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success();

    cli()
        .env("XDG_CONFIG_HOME", &config_home)
        .arg("list")
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Aspirin"));

    cli()
        .env("XDG_CONFIG_HOME", &config_home)
        .args(["remind", "--once"])
        .arg("--data-dir")
        .arg(&data_dir)
        .assert()
        .failure();
}
