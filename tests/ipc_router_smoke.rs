use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    assert_eq!(value.get("ok").and_then(|v| v.as_bool()), Some(false), "{}", value);
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn assert_routed(value: &serde_json::Value, method: &str) {
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        assert_ne!(
            error_code(value),
            "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").is_some_and(|v| v.is_null()));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["students"], 0);
    assert_eq!(selected["subjects"], 0);

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "name": "Smoke Student" }),
    );
    let student_id = student["studentId"].as_str().expect("studentId").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.create",
        json!({ "name": "Math", "total": 20 }),
    );

    let calls = vec![
        ("students.list", json!({})),
        ("subjects.list", json!({})),
        ("marks.get", json!({ "studentId": student_id })),
        (
            "marks.set",
            json!({ "studentId": student_id, "sequence": "firstSequence", "subjectName": "Math", "value": 12 }),
        ),
        (
            "marks.bulkSet",
            json!({ "sequence": 2, "subjectName": "Math", "entries": [{ "studentId": student_id, "value": "14" }] }),
        ),
        ("comments.get", json!({ "studentId": student_id })),
        (
            "comments.set",
            json!({ "studentId": student_id, "viewKey": "annual", "text": "Good year" }),
        ),
        ("results.sequence", json!({ "sequence": "firstSequence" })),
        ("results.terms", json!({})),
        ("results.view", json!({ "view": "sequence", "sequence": "3" })),
        ("reports.results", json!({ "view": "firstTerm" })),
        ("reports.student", json!({ "view": "annual", "studentId": student_id })),
        ("reports.allStudents", json!({ "view": "secondSequence" })),
        (
            "backup.exportWorkspaceBundle",
            json!({ "outPath": bundle_out.to_string_lossy() }),
        ),
        (
            "backup.importWorkspaceBundle",
            json!({ "inPath": bundle_out.to_string_lossy() }),
        ),
        ("workspace.reset", json!({})),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let id = format!("call-{}", i);
        let value = request(&mut stdin, &mut reader, &id, method, params);
        assert_routed(&value, method);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
    }

    let unknown = request(&mut stdin, &mut reader, "99", "grades.explode", json!({}));
    assert_eq!(error_code(&unknown), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn bad_json_line_gets_an_error_and_the_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_json"));

    let _ = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn data_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    for (i, method) in ["students.list", "subjects.list", "results.terms", "workspace.reset"]
        .into_iter()
        .enumerate()
    {
        let value = request(&mut stdin, &mut reader, &i.to_string(), method, json!({}));
        assert_eq!(error_code(&value), "no_workspace", "{}", method);
    }
    let value = request(
        &mut stdin,
        &mut reader,
        "9",
        "students.create",
        json!({ "name": "Ann" }),
    );
    assert_eq!(error_code(&value), "no_workspace");

    drop(stdin);
    let _ = child.wait();
}
