#![cfg(all(unix, feature = "cli"))]

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/mcsmux-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn run_send_with_retry(sock_path: &PathBuf, extra: &[&str], timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_mcsmux"));
        cmd.arg("--log-level")
            .arg("error")
            .arg("send")
            .arg(sock_path)
            .args(extra);
        let output = cmd.output().expect("send command should run");
        if output.status.success() {
            return output;
        }
        if start.elapsed() >= timeout {
            panic!(
                "send did not succeed within {timeout:?}: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn listen_receives_payload_from_send() {
    let dir = unique_temp_dir("roundtrip");
    let sock_path = dir.join("session.sock");

    let mut listener = Command::new(env!("CARGO_BIN_EXE_mcsmux"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("pretty")
        .arg("listen")
        .arg(&sock_path)
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    let send_output = run_send_with_retry(&sock_path, &["--data", "hello"], Duration::from_secs(5));
    assert!(send_output.status.success());

    let listener_output = listener
        .wait_with_output()
        .expect("listen should exit after one payload");
    assert!(listener_output.status.success());

    let stdout = String::from_utf8_lossy(&listener_output.stdout);
    assert!(stdout.contains("hello"), "stdout was: {stdout}");
    assert!(stdout.contains("GLOBAL"), "stdout was: {stdout}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_on_static_channel_reaches_listener() {
    let dir = unique_temp_dir("static");
    let sock_path = dir.join("session.sock");

    let mut listener = Command::new(env!("CARGO_BIN_EXE_mcsmux"))
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("pretty")
        .arg("listen")
        .arg(&sock_path)
        .arg("--channels")
        .arg("cliprdr")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    let send_output = run_send_with_retry(
        &sock_path,
        &["--channel", "cliprdr", "--data", "clipboard-bytes"],
        Duration::from_secs(5),
    );
    assert!(send_output.status.success());

    let listener_output = listener
        .wait_with_output()
        .expect("listen should exit after one payload");
    let stdout = String::from_utf8_lossy(&listener_output.stdout);
    assert!(stdout.contains("clipboard-bytes"), "stdout was: {stdout}");
    assert!(stdout.contains("STATIC"), "stdout was: {stdout}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_mcsmux"))
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "stdout was: {stdout}");
}
