//! End-to-end tests for the command-line host.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_code-recorder"));
    cmd.env_remove("RUST_LOG");
    for (key, _) in std::env::vars() {
        if key.starts_with("CODE_RECORDER_") {
            cmd.env_remove(key);
        }
    }
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

const LOG: &str = "Sequence,Time,File,RangeOffset,RangeLength,Text,Language,Type\n\
1,0,\"a.txt\",0,0,\"hello\",plaintext,tab\n\
2,1200,\"a.txt\",5,0,\" world\",plaintext,content\n";

fn write_log(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("session.csv");
    fs::write(&path, LOG).unwrap();
    path
}

#[test]
fn export_writes_requested_format() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let output = bin()
        .args(["export", log.to_str().unwrap(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = fs::read_to_string(dir.path().join("session.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value[1]["text"], "hello world");
    // Duration defaults to the last row's time.
    assert_eq!(value[1]["endTime"], 1200);
    assert!(!dir.path().join("session.srt").exists());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["changes"], 2);
}

#[test]
fn export_refuses_existing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());
    fs::write(dir.path().join("session.srt"), "old").unwrap();

    let output = bin()
        .args(["export", log.to_str().unwrap(), "--duration-ms", "5000"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("session.srt")).unwrap(),
        "old"
    );
    assert!(!dir.path().join("session.json").exists());
}

#[test]
fn record_drives_a_session_from_stdin() {
    let ws = tempfile::tempdir().unwrap();
    let mut cmd = bin();
    cmd.args(["record", "--workspace", ws.path().to_str().unwrap()]);

    let input = concat!(
        r#"{"event":"edit","file":"a.txt","changes":[]}"#,
        "\n",
        r#"{"event":"start","document":{"file":"a.txt","language":"plaintext","text":"hi"}}"#,
        "\n",
        "not json\n",
        r#"{"event":"edit","file":"a.txt","language":"plaintext","changes":[{"rangeOffset":2,"rangeLength":0,"text":"!"}]}"#,
        "\n",
        r#"{"event":"stop"}"#,
        "\n",
    );
    let output = run_with_stdin(cmd, input);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["changes"], 2);
    assert_eq!(summary["outputs"].as_array().unwrap().len(), 2);

    let recordings: Vec<_> = fs::read_dir(ws.path().join("code-recordings"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(recordings.len(), 3);
    let json = recordings
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "json"))
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(value[1]["text"], "hi!");
}
