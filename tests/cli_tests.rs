//! Command-line surface: argument handling and exit codes

use std::io::Write;
use std::process::{Command, Output};

fn oracle(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fusion-oracle"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to launch fusion-oracle")
}

fn small_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"vector_size": 32, "matrix": {{"rows": 16, "cols": 16}}, "pattern": {{"rows": 4, "cols": 8}}}}"#
    )
    .unwrap();
    file
}

#[test]
fn test_missing_ordinal_is_usage_error() {
    let out = oracle(&[]);
    assert_eq!(out.status.code(), Some(2));
    assert!(!out.stderr.is_empty());
    assert!(out.stdout.is_empty());
}

#[test]
fn test_extra_argument_is_usage_error() {
    let out = oracle(&["0", "1"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_non_numeric_ordinal_is_usage_error() {
    let out = oracle(&["first"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn test_out_of_range_ordinal_exits_before_tests() {
    let out = oracle(&["5"]);
    assert_eq!(out.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("DeviceNotFound"));
    assert!(!String::from_utf8_lossy(&out.stdout).contains("Testing"));
}

#[test]
fn test_full_run_succeeds() {
    let config = small_config();
    let out = oracle(&["0", "--config", config.path().to_str().unwrap()]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(out.status.code(), Some(0), "{}", stdout);
    assert!(stdout.contains("Device Info"));
    assert!(stdout.contains("Testing w = x + y... OK"));
    assert!(stdout.contains("## Test completed successfully"));
}

#[test]
fn test_numeric_failure_exits_with_status_one() {
    let out = oracle(&["0", "--suite", "vector", "--tolerance", "1e-300"]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("# Error at operation: vector-inner-prod"), "{}", stdout);
    let diff = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("diff: "))
        .expect("no diff line");
    assert!(diff.parse::<f64>().unwrap() > 1e-300);
    assert!(stdout.contains("## Test FAILED at 'vector-inner-prod'"));
    assert!(String::from_utf8_lossy(&out.stderr).contains("vector-inner-prod"));
}

#[test]
fn test_redirected_log_output_has_no_colour_codes() {
    let config = small_config();
    let out = oracle(&["0", "-vv", "--suite", "vector", "--config", config.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("starting run"), "{}", stderr);
    assert!(!stderr.contains('\x1b'));
}

#[test]
fn test_list_devices() {
    let out = oracle(&["--list-devices"]);
    assert_eq!(out.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[0] Host Simulation / Simulated Fused-Kernel GPU"));
    assert!(stdout.contains("[1] Host Simulation / Simulated Host CPU"));
}

#[test]
fn test_invalid_config_exits_with_config_status() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"vector_size": 0}}"#).unwrap();
    let out = oracle(&["0", "--config", file.path().to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(4));
}
