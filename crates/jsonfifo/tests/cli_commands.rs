#![cfg(all(unix, feature = "cli"))]

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

fn unique_temp_dir(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "jsonfifo-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

fn jsonfifo() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jsonfifo"));
    cmd.env_remove("JSONFIFO_DIR")
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json");
    cmd
}

fn json_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be json"))
        .collect()
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        match child.try_wait().expect("child status should be readable") {
            Some(_) => return child.wait_with_output().expect("output should be readable"),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                let output = child.wait_with_output().expect("output should be readable");
                panic!(
                    "process timed out; stdout: {} stderr: {}",
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    }
}

fn spawn_connect(role: &str, dir: &Path, send: &Value, count: Option<usize>) -> Child {
    let mut cmd = jsonfifo();
    cmd.arg("connect")
        .arg(role)
        .arg("chat")
        .arg("--dir")
        .arg(dir)
        .arg("--send")
        .arg(send.to_string());
    if let Some(count) = count {
        cmd.arg("--count").arg(count.to_string());
    }
    cmd.arg("--no-stdin")
        .arg("--reopen-delay")
        .arg("20ms")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("connect command should start")
}

#[test]
fn paths_prints_mirrored_layout() {
    let dir = unique_temp_dir("paths");

    let host = jsonfifo()
        .args(["paths", "host", "chat", "--dir"])
        .arg(&dir)
        .output()
        .expect("paths should run");
    let client = jsonfifo()
        .args(["paths", "client", "chat", "--dir"])
        .arg(&dir)
        .output()
        .expect("paths should run");
    assert!(host.status.success());
    assert!(client.status.success());

    let host = &json_lines(&host.stdout)[0];
    let client = &json_lines(&client.stdout)[0];
    let fifo = |name: &str| json!(dir.join(name).to_string_lossy());

    assert_eq!(host["role"], "host");
    assert_eq!(host["in"], fifo("chat.in"));
    assert_eq!(host["out"], fifo("chat.out"));
    assert_eq!(client["in"], host["out"]);
    assert_eq!(client["out"], host["in"]);
    assert!(!dir.exists(), "paths must not touch the filesystem");
}

#[test]
fn provision_creates_fifos_idempotently() {
    let dir = unique_temp_dir("provision");

    for _ in 0..2 {
        let output = jsonfifo()
            .args(["provision", "chat", "--dir"])
            .arg(&dir)
            .output()
            .expect("provision should run");
        assert!(
            output.status.success(),
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    for name in ["chat.in", "chat.out"] {
        let meta = std::fs::symlink_metadata(dir.join(name)).expect("fifo should exist");
        assert!(meta.file_type().is_fifo(), "{name} should be a fifo");
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn dir_falls_back_to_environment() {
    let dir = unique_temp_dir("env");

    let output = Command::new(env!("CARGO_BIN_EXE_jsonfifo"))
        .env("JSONFIFO_DIR", &dir)
        .args(["--format", "json", "--log-level", "error", "paths", "host", "chat"])
        .output()
        .expect("paths should run");
    assert!(output.status.success());

    let paths = &json_lines(&output.stdout)[0];
    assert_eq!(paths["directory"], json!(dir.to_string_lossy()));
}

#[test]
fn invalid_channel_name_is_usage_error() {
    let dir = unique_temp_dir("bad-name");

    let output = jsonfifo()
        .args(["provision", "../escape", "--dir"])
        .arg(&dir)
        .output()
        .expect("provision should run");

    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid channel name"));
    assert!(!dir.exists());
}

#[test]
fn connect_reports_provisioning_failure() {
    let dir = unique_temp_dir("blocked");
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    let blocker = dir.join("file");
    std::fs::write(&blocker, b"not a directory").expect("file should be writable");

    let child = jsonfifo()
        .args(["connect", "host", "chat", "--no-stdin", "--dir"])
        .arg(&blocker)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("connect command should start");
    let output = wait_with_timeout(child, Duration::from_secs(10));

    assert_eq!(output.status.code(), Some(3));
    let events = json_lines(&output.stdout);
    assert!(
        events
            .iter()
            .any(|e| e["event"] == "error" && e["kind"] == "provision"),
        "{events:?}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn host_and_client_processes_exchange_messages() {
    let dir = unique_temp_dir("exchange");

    // The host runs until stopped; the client leaves after its first message.
    let mut host = spawn_connect("host", &dir, &json!({"fromHost": "blub"}), None);
    let client = spawn_connect("client", &dir, &json!({"fromClient": "x"}), Some(1));

    let client = wait_with_timeout(client, Duration::from_secs(15));
    thread::sleep(Duration::from_millis(300));
    let _ = host.kill();
    let host = host.wait_with_output().expect("host output should be readable");

    assert!(
        client.status.success(),
        "client stderr: {}",
        String::from_utf8_lossy(&client.stderr)
    );

    let host_events = json_lines(&host.stdout);
    let client_events = json_lines(&client.stdout);

    assert!(
        host_events
            .iter()
            .any(|e| e["event"] == "data" && e["data"] == json!({"fromClient": "x"})),
        "{host_events:?}"
    );
    assert!(
        client_events
            .iter()
            .any(|e| e["event"] == "data" && e["data"] == json!({"fromHost": "blub"})),
        "{client_events:?}"
    );
    assert!(host_events.iter().any(|e| e["event"] == "connected"));
    assert!(
        host_events.iter().any(|e| e["event"] == "disconnected"),
        "host should see the client leave: {host_events:?}"
    );
    assert!(client_events.iter().all(|e| e["role"] == "client"));

    let _ = std::fs::remove_dir_all(&dir);
}
