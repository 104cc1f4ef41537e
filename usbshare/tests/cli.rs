use assert_cmd::Command;
use predicates::prelude::*;

fn usbshare() -> Command {
    Command::new(env!("CARGO_BIN_EXE_usbshare"))
}

#[test]
fn test_help_lists_subcommands() {
    usbshare()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version() {
    usbshare()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("usbshare "));
}

#[test]
fn test_check_is_read_only_report() {
    let dir = tempfile::TempDir::new().unwrap();
    usbshare()
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Board"))
        .stdout(predicate::str::contains("usbshare.py present"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unknown_subcommand_fails() {
    usbshare()
        .arg("flash")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_packaged_license_file_exists() {
    let license = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../LICENSE");
    let text = std::fs::read_to_string(license).unwrap();
    assert!(text.starts_with("MIT License"));
}
