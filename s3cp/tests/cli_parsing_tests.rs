//! CLI Argument Parsing and Validation Tests for s3cp
//!
//! These tests verify that command-line arguments are parsed correctly and that every
//! configuration error is rejected with its own exit code before any request is sent to S3.

use assert_cmd::Command;

fn s3cp() -> Command {
    Command::cargo_bin("s3cp").unwrap()
}

#[test]
fn test_help_runs() {
    s3cp().arg("--help").assert().success();
}

#[test]
fn test_version_runs() {
    s3cp().arg("--version").assert().success();
}

#[test]
fn test_help_lists_option_groups() {
    s3cp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Copy options"))
        .stdout(predicates::str::contains("Object attributes"))
        .stdout(predicates::str::contains("--storage-class"));
}

#[test]
fn test_missing_destination_fails() {
    s3cp().arg("s3://src/file.txt").assert().failure();
}

// ============================================================================
// Address Validation Tests
// ============================================================================

#[test]
fn test_malformed_source_exit_code() {
    s3cp()
        .args(["not-a-url", "s3://dst/backup/"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("invalid source address"));
}

#[test]
fn test_malformed_destination_exit_code() {
    s3cp()
        .args(["s3://src/file.txt", "no-scheme-here"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("invalid destination address"));
}

#[test]
fn test_unsupported_source_scheme_exit_code() {
    s3cp()
        .args(["gs://src/file.txt", "s3://dst/"])
        .assert()
        .code(3)
        .stderr(predicates::str::contains("unsupported scheme"));
}

#[test]
fn test_unsupported_destination_scheme_exit_code() {
    s3cp()
        .args(["s3://src/file.txt", "https://dst/"])
        .assert()
        .code(3);
}

#[test]
fn test_missing_key_without_recursive_exit_code() {
    s3cp()
        .args(["s3://src", "s3://dst/"])
        .assert()
        .code(1)
        .stderr(predicates::str::contains("--recursive"));
}

#[test]
fn test_quiet_suppresses_error_message() {
    s3cp()
        .args(["-q", "gs://src/file.txt", "s3://dst/"])
        .assert()
        .code(3)
        .stderr(predicates::str::is_empty());
}

// ============================================================================
// Option Validation Tests
// ============================================================================

#[test]
fn test_invalid_acl_exit_code() {
    s3cp()
        .args(["--acl", "world-writable", "s3://src/file.txt", "s3://dst/"])
        .assert()
        .code(6)
        .stderr(predicates::str::contains("unknown ACL"));
}

#[test]
fn test_invalid_storage_class_exit_code() {
    s3cp()
        .args(["--storage-class", "COLD", "s3://src/file.txt", "s3://dst/"])
        .assert()
        .code(6)
        .stderr(predicates::str::contains("unknown storage class"));
}

#[test]
fn test_invalid_wait_delay_exit_code() {
    s3cp()
        .args(["--wait", "--wait-delay", "soon", "s3://src/a", "s3://dst/"])
        .assert()
        .code(6)
        .stderr(predicates::str::contains("--wait-delay"));
}

#[test]
fn test_zero_wait_delay_exit_code() {
    s3cp()
        .args(["--wait", "--wait-delay", "0s", "s3://src/a", "s3://dst/"])
        .assert()
        .code(6)
        .stderr(predicates::str::contains("--wait-delay must be greater than zero"));
}

#[test]
fn test_zero_wait_delay_ignored_without_wait() {
    // without --wait the delay is never used, the run fails later on the scheme check
    s3cp()
        .args(["--wait-delay", "0s", "gs://src/a", "s3://dst/"])
        .assert()
        .code(3);
}

#[test]
fn test_zero_concurrency_rejected() {
    s3cp()
        .args(["-c", "0", "s3://src/file.txt", "s3://dst/"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value '0'"));
}

#[test]
fn test_non_numeric_concurrency_rejected() {
    s3cp()
        .args(["--concurrency", "many", "s3://src/file.txt", "s3://dst/"])
        .assert()
        .failure();
}

#[test]
fn test_negative_timeout_accepted() {
    // parsing succeeds, the run then fails on the address check without touching the network
    s3cp()
        .args(["-t", "-1", "gs://src/a", "s3://dst/"])
        .assert()
        .code(3);
}

// ============================================================================
// ProgressType Argument Parsing Tests
// ============================================================================

#[test]
fn test_progress_type_auto_lowercase() {
    s3cp()
        .args(["--progress-type", "auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_auto_capitalized() {
    s3cp()
        .args(["--progress-type", "Auto", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_progress_bar_pascal_case() {
    s3cp()
        .args(["--progress-type", "ProgressBar", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_progress_bar_kebab_case() {
    s3cp()
        .args(["--progress-type", "progress-bar", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_text_updates_kebab_case() {
    s3cp()
        .args(["--progress-type", "text-updates", "--help"])
        .assert()
        .success();
}

#[test]
fn test_progress_type_invalid_value() {
    s3cp()
        .args(["--progress-type", "invalid-value", "--help"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("invalid value 'invalid-value'"));
}

// ============================================================================
// Flag Parsing Tests
// ============================================================================

#[test]
fn test_short_flags() {
    s3cp()
        .args(["-r", "-w", "-q", "-vv", "-c", "5", "-t", "30", "-a", "private", "--help"])
        .assert()
        .success();
}

#[test]
fn test_session_options() {
    s3cp()
        .args([
            "--region",
            "eu-west-1",
            "--endpoint-url",
            "http://localhost:9000",
            "--force-path-style",
            "--help",
        ])
        .assert()
        .success();
}
