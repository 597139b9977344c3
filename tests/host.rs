use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};

fn frame(v: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(v).unwrap();
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend(body);
    out
}

fn unframe(mut bytes: &[u8]) -> Vec<Value> {
    let mut out = Vec::new();
    while bytes.len() >= 4 {
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        out.push(serde_json::from_slice(&bytes[4..4 + len]).unwrap());
        bytes = &bytes[4 + len..];
    }
    out
}

fn run_host(requests: &[Value]) -> Vec<Value> {
    let tmp = tempfile::tempdir().unwrap();
    let input: Vec<u8> = requests.iter().flat_map(frame).collect();
    let output = Command::cargo_bin("kb_rag_host")
        .unwrap()
        .env("HOME", tmp.path())
        .env("KB_RAG_LOG_DIR", tmp.path().join("logs"))
        .env_remove("OPENAI_API_KEY")
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());
    unframe(&output.stdout)
}

#[test]
fn missing_knowledge_dir_serves_empty_context() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("does-not-exist");
    let responses = run_host(&[
        json!({ "id": "1", "method": "hello" }),
        json!({ "id": "2", "method": "init", "params": { "knowledgeDir": missing } }),
        json!({ "id": "3", "method": "retrieve", "params": { "q": "How to optimize processes?" } }),
        json!({ "id": "4", "method": "stats" }),
    ]);

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0]["result"]["hostImpl"], "rust");
    assert_eq!(responses[1]["result"]["ok"], true);
    assert_eq!(responses[1]["result"]["stats"]["fragments"], 0);
    assert_eq!(responses[2]["result"]["block"], "");
    assert_eq!(responses[2]["result"]["fragments"], json!([]));
    assert_eq!(responses[3]["result"]["corpusMissing"], true);
}

#[test]
fn requests_before_init_and_unknown_methods_return_errors() {
    let responses = run_host(&[
        json!({ "id": "a", "method": "retrieve", "params": { "q": "x" } }),
        json!({ "id": "b", "method": "nope" }),
    ]);

    assert_eq!(responses.len(), 2);
    assert!(responses[0]["error"].as_str().unwrap().contains("init"));
    assert_eq!(responses[1]["id"], "b");
    assert!(responses[1]["error"].as_str().unwrap().contains("Unknown method"));
}

#[test]
fn out_of_range_top_k_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("does-not-exist");
    let responses = run_host(&[
        json!({ "id": "1", "method": "init", "params": { "knowledgeDir": missing } }),
        json!({ "id": "2", "method": "retrieve", "params": { "q": "x", "topK": -1 } }),
        json!({ "id": "3", "method": "retrieve", "params": { "q": "x", "topK": 1.5 } }),
        json!({ "id": "4", "method": "retrieve", "params": { "q": "x", "topK": 2 } }),
    ]);

    assert_eq!(responses.len(), 4);
    assert!(responses[1]["error"].as_str().unwrap().contains("topK"));
    assert!(responses[2]["error"].as_str().unwrap().contains("topK"));
    assert_eq!(responses[3]["result"]["block"], "");
}

#[test]
fn clear_empties_cache_and_keeps_serving() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("does-not-exist");
    let responses = run_host(&[
        json!({ "id": "1", "method": "clear" }),
        json!({ "id": "2", "method": "init", "params": {
            "knowledgeDir": missing,
            "cachePath": tmp.path().join("snapshots.db")
        } }),
        json!({ "id": "3", "method": "clear" }),
        json!({ "id": "4", "method": "stats" }),
    ]);

    assert_eq!(responses.len(), 4);
    assert!(responses[0]["error"].as_str().unwrap().contains("init"));
    assert_eq!(responses[2]["result"]["ok"], true);
    assert_eq!(responses[3]["result"]["fragments"], 0);
}

#[test]
fn embedding_without_api_key_fails_init_but_host_keeps_running() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(
        tmp.path().join("kb.txt"),
        "Fragment A about finance.\n\nFragment B about process optimization.",
    )
    .unwrap();

    let responses = run_host(&[
        json!({ "id": "1", "method": "init", "params": { "knowledgeDir": tmp.path() } }),
        json!({ "id": "2", "method": "hello" }),
    ]);

    assert_eq!(responses.len(), 2);
    assert!(responses[0]["error"].as_str().unwrap().contains("OPENAI_API_KEY"));
    assert_eq!(responses[1]["result"]["type"], "hello-response");
}

#[test]
fn empty_stdin_exits_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("kb_rag_host")
        .unwrap()
        .env("KB_RAG_LOG_DIR", tmp.path())
        .write_stdin(Vec::<u8>::new())
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}
