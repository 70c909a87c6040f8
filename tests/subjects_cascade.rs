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

fn select(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
}

fn create_subject(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    name: &str,
    total: f64,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "subjects.create",
        json!({ "name": name, "total": total }),
    );
    created["subjectId"].as_str().expect("subjectId").to_string()
}

fn set_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    student_id: &str,
    sequence: &str,
    subject: &str,
    value: f64,
) {
    let set = request_ok(
        stdin,
        reader,
        id,
        "marks.set",
        json!({ "studentId": student_id, "sequence": sequence, "subjectName": subject, "value": value }),
    );
    assert_eq!(set["accepted"], true, "{}", set);
}

#[test]
fn deleting_a_subject_strips_it_from_every_slot() {
    let workspace = temp_dir("gradebook-subject-delete");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);

    let ann = request_ok(&mut stdin, &mut reader, "1", "students.create", json!({ "name": "Ann" }));
    let ann = ann["studentId"].as_str().expect("id").to_string();
    let math = create_subject(&mut stdin, &mut reader, "2", "Math", 20.0);
    let _ = create_subject(&mut stdin, &mut reader, "3", "English", 20.0);
    set_mark(&mut stdin, &mut reader, "4", &ann, "firstSequence", "Math", 10.0);
    set_mark(&mut stdin, &mut reader, "5", &ann, "fourthSequence", "Math", 12.0);
    set_mark(&mut stdin, &mut reader, "6", &ann, "firstSequence", "English", 16.0);

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.delete",
        json!({ "subjectId": math }),
    );
    assert_eq!(deleted["name"], "Math");

    let marks = request_ok(&mut stdin, &mut reader, "8", "marks.get", json!({ "studentId": ann }));
    for (_, slot) in marks["marks"].as_object().expect("record") {
        assert!(slot.get("Math").is_none(), "Math still present: {}", marks);
    }
    assert_eq!(marks["marks"]["firstSequence"]["English"], 16.0);

    // English alone is now the whole possible total.
    let results = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "results.sequence",
        json!({ "sequence": "firstSequence" }),
    );
    let row = &results["rows"][0];
    assert_eq!(row["totalMarks"], 16.0);
    assert_eq!(row["average"], 16.0);

    let again = request(
        &mut stdin,
        &mut reader,
        "10",
        "subjects.delete",
        json!({ "subjectId": math }),
    );
    assert_eq!(error_code(&again), "not_found");

    drop(stdin);
    let _ = child.wait();

    // The cascade was persisted, not just applied in memory.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);
    let marks = request_ok(&mut stdin, &mut reader, "11", "marks.get", json!({ "studentId": ann }));
    assert!(marks["marks"]["fourthSequence"].get("Math").is_none());
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn renaming_a_subject_moves_its_marks() {
    let workspace = temp_dir("gradebook-subject-rename");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);

    let ann = request_ok(&mut stdin, &mut reader, "1", "students.create", json!({ "name": "Ann" }));
    let ann = ann["studentId"].as_str().expect("id").to_string();
    let maths = create_subject(&mut stdin, &mut reader, "2", "Maths", 20.0);
    set_mark(&mut stdin, &mut reader, "3", &ann, "secondSequence", "Maths", 14.0);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.update",
        json!({ "subjectId": maths, "name": "Mathematics" }),
    );
    assert_eq!(updated["name"], "Mathematics");
    assert_eq!(updated["total"], 20.0);
    assert_eq!(updated["staleMarks"], json!([]));

    let marks = request_ok(&mut stdin, &mut reader, "5", "marks.get", json!({ "studentId": ann }));
    assert_eq!(marks["marks"]["secondSequence"]["Mathematics"], 14.0);
    assert!(marks["marks"]["secondSequence"].get("Maths").is_none());

    let subjects = request_ok(&mut stdin, &mut reader, "6", "subjects.list", json!({}));
    assert_eq!(subjects["subjects"][0]["name"], "Mathematics");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn lowering_a_total_reports_stale_marks_without_rewriting_them() {
    let workspace = temp_dir("gradebook-subject-stale");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);

    let ann = request_ok(&mut stdin, &mut reader, "1", "students.create", json!({ "name": "Ann" }));
    let ann = ann["studentId"].as_str().expect("id").to_string();
    let art = create_subject(&mut stdin, &mut reader, "2", "Art", 40.0);
    set_mark(&mut stdin, &mut reader, "3", &ann, "fifthSequence", "Art", 30.0);

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.update",
        json!({ "subjectId": art, "total": 20 }),
    );
    let stale = updated["staleMarks"].as_array().expect("staleMarks");
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0]["studentId"], ann.as_str());
    assert_eq!(stale[0]["sequence"], "fifthSequence");
    assert_eq!(stale[0]["value"], 30.0);

    let marks = request_ok(&mut stdin, &mut reader, "5", "marks.get", json!({ "studentId": ann }));
    assert_eq!(marks["marks"]["fifthSequence"]["Art"], 30.0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn subject_names_are_unique_and_totals_positive() {
    let workspace = temp_dir("gradebook-subject-conflict");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select(&mut stdin, &mut reader, &workspace);

    let _ = create_subject(&mut stdin, &mut reader, "1", "Math", 20.0);
    let english = create_subject(&mut stdin, &mut reader, "2", "English", 20.0);

    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Math", "total": 20 }),
    );
    assert_eq!(error_code(&dup), "conflict");

    let rename_clash = request(
        &mut stdin,
        &mut reader,
        "4",
        "subjects.update",
        json!({ "subjectId": english, "name": "Math" }),
    );
    assert_eq!(error_code(&rename_clash), "conflict");

    for (i, total) in [json!(0), json!(-5), json!("twenty")].into_iter().enumerate() {
        let bad = request(
            &mut stdin,
            &mut reader,
            &format!("bad-{}", i),
            "subjects.create",
            json!({ "name": format!("Extra{}", i), "total": total }),
        );
        assert_eq!(error_code(&bad), "bad_params");
    }

    drop(stdin);
    let _ = child.wait();
}
