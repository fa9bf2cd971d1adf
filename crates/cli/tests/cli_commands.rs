use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn docqa(workdir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("docqa"));
    cmd.current_dir(workdir)
        .env_remove("DOCQA_DATA_DIR")
        .env_remove("DOCQA_EMBEDDING_MODEL")
        .env_remove("DOCQA_BIND")
        .env_remove("DOCQA_AUTH_TOKEN")
        .env("DOCQA_EMBEDDING_MODE", "stub");
    cmd
}

/// Stub embeddings and the stub answerer keep every command offline
fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("docqa.toml");
    let config = format!(
        r#"data_dir = '{}'

[chunking]
chunk_size = 200
overlap = 40

[embedding]
mode = "stub"
dimension = 16

[[answer.providers]]
kind = "stub"
"#,
        dir.join("data").display()
    );
    std::fs::write(&path, config).unwrap();
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn serve_refuses_non_loopback_without_public() {
    let tmp = TempDir::new().unwrap();
    docqa(tmp.path())
        .args(["serve", "--bind", "0.0.0.0:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Refusing to bind"));
}

#[test]
fn serve_public_requires_auth_token() {
    let tmp = TempDir::new().unwrap();
    docqa(tmp.path())
        .args(["serve", "--public", "--bind", "0.0.0.0:0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--public requires an auth token"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    docqa(tmp.path())
        .args(["--config", "nope.toml", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn one_shot_commands_share_the_persisted_store() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path());
    let doc = tmp.path().join("tokio.txt");
    let text: String = (0..8)
        .map(|i| format!("Fact {i}: the scheduler steals work between threads. "))
        .collect();
    std::fs::write(&doc, text).unwrap();

    let output = docqa(tmp.path())
        .args(["ingest", doc.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let reports = stdout_json(&output);
    assert_eq!(reports[0]["filename"], "tokio.txt");
    let chunks = reports[0]["chunks"].as_u64().unwrap();
    assert!(chunks > 1);

    let output = docqa(tmp.path()).arg("status").output().unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["documents_in_db"], chunks);

    let output = docqa(tmp.path())
        .args(["ask", "How does the scheduler balance work?"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let answer = stdout_json(&output);
    assert!(answer["answer"]
        .as_str()
        .unwrap()
        .starts_with("Based on the documents:"));
    assert!(!answer["sources"].as_array().unwrap().is_empty());

    let output = docqa(tmp.path()).arg("files").output().unwrap();
    assert_eq!(stdout_json(&output)["files"][0]["filename"], "tokio.txt");

    docqa(tmp.path())
        .args(["delete", "tokio.txt"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"chunks_deleted\""));

    docqa(tmp.path())
        .args(["delete", "tokio.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn ask_without_documents_fails() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path());
    docqa(tmp.path())
        .args(["ask", "anything?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No documents uploaded yet"));
}

#[test]
fn data_dir_flag_overrides_the_config() {
    let tmp = TempDir::new().unwrap();
    write_config(tmp.path());
    let doc = tmp.path().join("a.txt");
    std::fs::write(&doc, "Short note.").unwrap();
    let other = tmp.path().join("other-data");

    docqa(tmp.path())
        .args(["--data-dir", other.to_str().unwrap(), "ingest"])
        .arg(&doc)
        .assert()
        .success();

    assert!(other.join("docqa_index.json").exists());
    assert!(other.join("docqa_index.index").exists());
    assert!(!tmp.path().join("data").join("docqa_index.json").exists());
}
