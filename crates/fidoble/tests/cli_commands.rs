#![cfg(feature = "cli")]

use std::process::{Command, Output};

fn fidoble(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fidoble"))
        .arg("--log-level")
        .arg("error")
        .args(args)
        .output()
        .expect("fidoble should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn version_prints_package_version() {
    let output = fidoble(&["version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("fidoble {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_json_lists_features() {
    let output = fidoble(&["--format", "json", "version", "--extended"]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "fidoble");
    let features = json["features"].as_array().expect("features array");
    assert!(features.iter().any(|f| f == "simulator"));
}

#[test]
fn fragment_json_reports_each_fragment() {
    let payload = "ab".repeat(40);
    let output = fidoble(&[
        "--format",
        "json",
        "fragment",
        "--control-point-length",
        "20",
        "--hex",
        &payload,
    ]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["command"], "MSG");
    assert_eq!(json["payload_size"], 40);
    let fragments = json["fragments"].as_array().expect("fragments array");
    assert_eq!(fragments.len(), 3);
    assert_eq!(fragments[0]["kind"], "init");
    assert_eq!(fragments[2]["sequence"], 1);
}

#[test]
fn fragment_output_reassembles() {
    let output = fidoble(&[
        "--format",
        "raw",
        "fragment",
        "--command",
        "ping",
        "--control-point-length",
        "8",
        "--data",
        "hello fido authenticator",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("hex output");
    let fragments: Vec<&str> = stdout.lines().collect();
    assert!(fragments.len() > 3);

    let mut args = vec!["--format", "raw", "assemble"];
    args.extend(fragments.iter().copied());
    let output = fidoble(&args);

    assert!(output.status.success());
    assert_eq!(output.stdout, b"hello fido authenticator");
}

#[test]
fn fragment_rejects_short_control_point() {
    let output = fidoble(&["fragment", "--control-point-length", "2", "--hex", "01"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn fragment_rejects_conflicting_payloads() {
    let output = fidoble(&["fragment", "--hex", "01", "--data", "x"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn assemble_reports_error_code() {
    let output = fidoble(&["--format", "json", "assemble", "bf000106"]);

    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["command"], "ERROR");
    assert_eq!(json["valid"], true);
    assert_eq!(json["error_code"], "BUSY (0x06)");
}

#[test]
fn assemble_incomplete_frame_returns_60() {
    let output = fidoble(&["assemble", "830010aabb"]);

    assert_eq!(output.status.code(), Some(60));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("incomplete frame"));
}
