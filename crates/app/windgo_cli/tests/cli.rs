use assert_cmd::Command;
use predicates::prelude::*;

fn windgo(config_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("windgo").unwrap();
    cmd.env("WINDGO_CONFIG_DIR", config_dir)
        .env("WINDGO_BASE_URL", "http://127.0.0.1:9")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn version_prints_package_version() {
    let dir = tempfile::tempdir().unwrap();
    windgo(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn help_lists_login_commands() {
    let dir = tempfile::tempdir().unwrap();
    windgo(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ssh-login")
                .and(predicate::str::contains("device-login"))
                .and(predicate::str::contains("revoke-device")),
        );
}

#[test]
fn whoami_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    windgo(dir.path())
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not logged in"));
}

#[test]
fn whoami_reads_stored_credentials() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("credentials.json"),
        r#"{"base_url":"http://localhost:8080","access_token":"t","refresh_token":"r","device_id":"dev_abc","user_id":3,"username":"octo"}"#,
    )
    .unwrap();

    windgo(dir.path())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("octo (id 3)").and(predicate::str::contains("dev_abc")));
}

#[test]
fn refresh_requires_a_device_login() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("credentials.json"),
        r#"{"base_url":"http://localhost:8080","access_token":"t","user_id":3,"username":"bob"}"#,
    )
    .unwrap();

    windgo(dir.path())
        .arg("refresh")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No refresh token stored"));
}

#[test]
fn unreachable_server_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    windgo(dir.path())
        .arg("rooms")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ERROR"));
}

#[test]
fn send_requires_content() {
    let dir = tempfile::tempdir().unwrap();
    windgo(dir.path()).args(["send", "1"]).assert().failure();
}
