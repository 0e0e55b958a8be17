use crate::backup;
use crate::db;
use crate::exchange;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{current_curriculum, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_exchange_export_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match optional_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let curriculum = match current_curriculum(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let checksum = match exchange::checksum(curriculum) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };
    if let Err(e) = exchange::write_json(&PathBuf::from(&path), curriculum, name.as_deref()) {
        return err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": path })),
        );
    }
    info!(path = %path, items = curriculum.items.len(), "curriculum exported");
    ok(
        &req.id,
        json!({
            "path": path,
            "format": exchange::EXPORT_FORMAT,
            "checksum": checksum,
            "itemCount": curriculum.items.len()
        }),
    )
}

fn handle_exchange_import_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let src = PathBuf::from(&path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "export file not found",
            Some(json!({ "path": path })),
        );
    }
    let envelope = match exchange::read_json(&src) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        }
    };
    let result = json!({
        "name": envelope.name,
        "exportedAt": envelope.exported_at,
        "curriculum": envelope.curriculum,
    });
    info!(path = %path, items = envelope.curriculum.items.len(), "curriculum imported");
    state.session.curriculum = Some(envelope.curriculum);
    ok(&req.id, result)
}

/// Writes to `path` when given; otherwise the CSV text is returned inline.
fn handle_exchange_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match optional_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let curriculum = match current_curriculum(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let text = match exchange::to_csv(curriculum) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "export_failed", e.to_string(), None),
    };
    let rows = curriculum.items.len();
    let Some(path) = path else {
        return ok(&req.id, json!({ "csv": text, "rowsExported": rows }));
    };

    let out = PathBuf::from(&path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "export_failed",
                e.to_string(),
                Some(json!({ "path": parent.to_string_lossy() })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, text) {
        return err(
            &req.id,
            "export_failed",
            e.to_string(),
            Some(json!({ "path": path })),
        );
    }
    ok(&req.id, json!({ "path": path, "rowsExported": rows }))
}

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    if let Some(conn) = state.db.as_ref() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_workspace_bundle(&workspace_path, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "export_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };

    info!(path = %out_path, "workspace bundle exported");
    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256
        }),
    )
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match required_str(req, "inPath") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let workspace_path = req
        .params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone());
    let Some(workspace_path) = workspace_path else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import = match backup::import_workspace_bundle(&src, &workspace_path) {
        Ok(v) => v,
        Err(e) => {
            // The previous database is untouched on failure; reopen it.
            if let Some(ws) = state.workspace.as_ref() {
                state.db = db::open_db(ws).ok();
            }
            return err(
                &req.id,
                "import_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    match db::open_db(&workspace_path) {
        Ok(conn) => {
            info!(
                workspace = %workspace_path.to_string_lossy(),
                format = %import.bundle_format_detected,
                "workspace bundle imported"
            );
            state.workspace = Some(workspace_path.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.exportJson" => Some(handle_exchange_export_json(state, req)),
        "exchange.importJson" => Some(handle_exchange_import_json(state, req)),
        "exchange.exportCsv" => Some(handle_exchange_export_csv(state, req)),
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
