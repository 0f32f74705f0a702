mod common;

use common::{parse_json, penv};

#[test]
fn check_python_rejects_missing_interpreter() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("no-such-python");

    let assert = penv(&temp.path().join("env"))
        .args(["--json", "check", "python"])
        .arg(&missing)
        .assert()
        .code(1);
    let payload = parse_json(&assert);
    assert_eq!(payload["status"], "user-error");
    assert_eq!(payload["details"]["code"], "PE300");
    assert_eq!(
        payload["details"]["python"],
        missing.display().to_string()
    );
}

#[test]
fn quiet_mode_reports_failures_on_stderr_only() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("no-such-python");

    let assert = penv(&temp.path().join("env"))
        .args(["-q", "check", "python", "--python"])
        .arg(&missing)
        .assert()
        .code(1);
    let output = assert.get_output();
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("penv check python"));
}
