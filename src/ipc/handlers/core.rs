use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

const MAX_USER_LEN: usize = 128;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "user": state.session.user,
            "catalogSize": state.session.catalog.as_ref().map(|c| c.catalog.len()),
            "hasCurriculum": state.session.curriculum.is_some()
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(workspace = %path.to_string_lossy(), "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

/// Saved curricula belong to this user until the next call.
fn handle_session_set_user(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = match required_str(req, "user") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if user.chars().count() > MAX_USER_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("user length must be <= {}", MAX_USER_LEN),
            None,
        );
    }
    info!(user = %user, "session user set");
    state.session.user = Some(user.clone());
    ok(&req.id, json!({ "user": user }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "session.setUser" => Some(handle_session_set_user(state, req)),
        _ => None,
    }
}
