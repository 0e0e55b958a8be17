mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{
    error_code, request, request_ok, spawn_sidecar, temp_dir, write_catalog, catalog_rows,
    year10_settings,
};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("curriculumd-router-smoke");
    let catalog = write_catalog(&workspace, json!({ "activities": catalog_rows(3) }));
    let json_out = workspace.join("smoke-export.json");
    let csv_out = workspace.join("smoke-export.csv");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let calls = vec![
        ("health", json!({})),
        ("workspace.select", json!({ "path": workspace.to_string_lossy() })),
        ("session.setUser", json!({ "user": "smoke" })),
        ("setup.get", json!({})),
        ("setup.update", json!({ "section": "generator", "patch": { "jitter": 0.2 } })),
        ("catalog.import", json!({ "path": catalog.to_string_lossy() })),
        ("catalog.list", json!({})),
        ("curriculum.generate", json!({ "settings": year10_settings(1, false), "seed": 3 })),
        ("curriculum.get", json!({})),
        ("curriculum.balance", json!({})),
        ("editor.addCandidates", json!({})),
        ("editor.swapCandidates", json!({ "uid": "missing" })),
        ("editor.moveWithinPeriod", json!({ "uid": "missing", "direction": "up" })),
        ("editor.remove", json!({ "uid": "missing" })),
        ("editor.add", json!({ "activityId": "missing", "period": "Sep" })),
        ("editor.quickAdd", json!({ "activityId": "missing" })),
        ("editor.moveToPeriod", json!({ "uid": "missing", "period": "Oct" })),
        ("editor.swap", json!({ "uid": "missing", "activityId": "missing" })),
        ("editor.annotate", json!({ "uid": "missing", "notes": "x" })),
        ("curriculum.rebuild", json!({})),
        ("library.save", json!({ "name": "Smoke" })),
        ("library.list", json!({})),
        ("exchange.exportJson", json!({ "path": json_out.to_string_lossy() })),
        ("exchange.importJson", json!({ "path": json_out.to_string_lossy() })),
        ("exchange.exportCsv", json!({ "path": csv_out.to_string_lossy() })),
        ("backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let _ = request_ok(&mut stdin, &mut reader, &format!("{}", i + 1), method, params);
    }

    let unknown = request(&mut stdin, &mut reader, "99", "classes.list", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_line_gets_bad_json_and_loop_continues() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("response is json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["hasCurriculum"], json!(false));
    assert!(health["workspacePath"].is_null());

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn session_state_errors_are_reported_by_code() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let cases = [
        ("setup.get", json!({}), "no_workspace"),
        ("catalog.list", json!({}), "no_catalog"),
        ("curriculum.generate", json!({ "settings": year10_settings(1, false) }), "no_catalog"),
        ("curriculum.get", json!({}), "no_curriculum"),
        ("editor.remove", json!({ "uid": "x" }), "no_curriculum"),
        ("exchange.exportCsv", json!({}), "no_curriculum"),
        ("library.list", json!({}), "no_workspace"),
        ("session.setUser", json!({ "user": "  " }), "bad_params"),
    ];
    for (i, (method, params, code)) in cases.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("{}", i + 1), method, params);
        assert_eq!(error_code(&resp), Some(code), "{}: {}", method, resp);
    }

    drop(stdin);
    let _ = child.wait();
}
