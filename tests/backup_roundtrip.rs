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
    let exe = env!("CARGO_BIN_EXE_classroomd");
    let mut child = Command::new(exe)
        .env_remove("CLASSROOMD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classroomd");
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
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn backup_export_import_restores_workspace() {
    let source = temp_dir("classroomd-backup-src");
    let restored = temp_dir("classroomd-backup-dst");
    let bundle = source.join("exports").join("classroom-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "className": "Backup Class" }),
    );
    let class_id = created["class"]["id"].as_str().expect("class id").to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "fullName": "Vo Minh Khoa", "points": 12 }),
    );

    let export = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.export",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(export["bundleFormat"], "classroom-workspace-v1");
    assert_eq!(export["entryCount"], 2);
    assert_eq!(export["dbSha256"].as_str().map(|s| s.len()), Some(64));
    assert!(bundle.is_file());

    let import = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.import",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": restored.to_string_lossy() }),
    );
    assert_eq!(import["workspacePath"], restored.to_string_lossy().to_string());

    let health = request_ok(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(health["workspacePath"], restored.to_string_lossy().to_string());
    let students = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "classId": class_id }),
    );
    let rows = students["students"].as_array().expect("students");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["fullName"], "Vo Minh Khoa");
    assert_eq!(rows[0]["points"], 12);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn backup_import_rejects_non_bundle() {
    let workspace = temp_dir("classroomd-backup-bad");
    let bogus = workspace.join("not-a-bundle.zip");
    std::fs::write(&bogus, b"plain text").expect("write bogus bundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.import",
        json!({ "inPath": bogus.to_string_lossy(), "workspacePath": workspace.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "backup_import_failed");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "backup.import",
        json!({ "inPath": workspace.join("absent.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.export",
        json!({ "outPath": workspace.join("out.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "no_workspace");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn rejected_import_keeps_current_workspace_open() {
    let workspace = temp_dir("classroomd-backup-keep");
    let junk = workspace.join("junk.zip");
    std::fs::write(&junk, b"PK not really a zip").expect("write junk bundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "className": "Still Here" }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.import",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "backup_import_failed");

    let listed = request_ok(&mut stdin, &mut reader, "4", "classes.list", json!({}));
    let classes = listed["classes"].as_array().expect("classes");
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0]["className"], "Still Here");
    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health["workspacePath"], workspace.to_string_lossy().to_string());

    let db_file = workspace.join("classroom.sqlite3");
    let before = std::fs::metadata(&db_file).expect("db metadata").len();
    assert!(before > 0);

    drop(stdin);
    let _ = child.wait();
}
