#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_curriculumd");
    let mut child = Command::new(exe)
        .env_remove("CURRICULUMD_CATALOG_URL")
        .env_remove("CURRICULUMD_CATALOG_KEY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn curriculumd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
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
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

pub fn error_code(value: &Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

const CATEGORIES: [&str; 5] = ["Vision", "Effort", "Systems", "Practice", "Attitude"];

/// `per_category` activities in each category, all Level 2 and pathway
/// `both`, every other one carrying a document. Ids look like `vision-03`.
fn document_url(id: &str, n: usize) -> Value {
    if n % 2 == 1 {
        json!(format!("https://docs.example.org/{}.pdf", id))
    } else {
        Value::Null
    }
}

pub fn catalog_rows(per_category: usize) -> Vec<Value> {
    let mut rows = Vec::new();
    for cat in CATEGORIES {
        for n in 1..=per_category {
            let id = format!("{}-{:02}", cat.to_ascii_lowercase(), n);
            rows.push(json!({
                "id": id,
                "name": format!("{} Activity {}", cat, n),
                "category": cat,
                "level": "Level 2",
                "pathway": "both",
                "summary": format!("Summary for {}", id),
                "guidance": format!("Guidance for {}", id),
                "document_url": document_url(&id, n),
                "slides_url": null
            }));
        }
    }
    rows
}

pub fn write_catalog(dir: &Path, tables: Value) -> PathBuf {
    let path = dir.join("catalog.json");
    std::fs::write(&path, serde_json::to_string_pretty(&tables).expect("catalog json"))
        .expect("write catalog fixture");
    path
}

/// Workspace selected, user set and a catalog of `per_category` activities imported.
pub fn ready_session(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &Path,
    per_category: usize,
) {
    let catalog = write_catalog(workspace, json!({ "activities": catalog_rows(per_category) }));
    let _ = request_ok(
        stdin,
        reader,
        "ready-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "ready-2",
        "session.setUser",
        json!({ "user": "tutor@example.org" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "ready-3",
        "catalog.import",
        json!({ "path": catalog.to_string_lossy() }),
    );
}

pub fn year10_settings(items_per_period: u8, fixed: bool) -> Value {
    json!({
        "yearGroup": 10,
        "pathway": "both",
        "profile": "mid",
        "includeFixedSessions": fixed,
        "itemsPerPeriod": items_per_period
    })
}
