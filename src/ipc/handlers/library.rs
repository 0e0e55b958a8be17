use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{current_curriculum, db_conn, optional_str, required_str, session_user};
use crate::ipc::types::{AppState, Request};
use crate::model::Curriculum;
use serde_json::json;
use tracing::info;

const MAX_NAME_LEN: usize = 120;

fn handle_library_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user = match session_user(state, req) {
        Ok(u) => u,
        Err(e) => return e,
    };
    match db::curricula_list(conn, user) {
        Ok(rows) => ok(&req.id, json!({ "curricula": rows })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_library_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user = match session_user(state, req) {
        Ok(u) => u,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if name.chars().count() > MAX_NAME_LEN {
        return err(
            &req.id,
            "bad_params",
            format!("name length must be <= {}", MAX_NAME_LEN),
            None,
        );
    }
    let id = match optional_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let curriculum = match current_curriculum(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let text = match serde_json::to_string(curriculum) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };

    match db::curricula_save(conn, user, id.as_deref(), &name, &text, curriculum.items.len()) {
        Ok((saved_id, created)) => {
            info!(id = %saved_id, created, items = curriculum.items.len(), "curriculum saved");
            ok(
                &req.id,
                json!({ "id": saved_id, "name": name, "created": created }),
            )
        }
        Err(e) => err(
            &req.id,
            "db_update_failed",
            format!("{e:#}"),
            Some(json!({ "name": name })),
        ),
    }
}

fn handle_library_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let saved = {
        let conn = match db_conn(state, req) {
            Ok(c) => c,
            Err(e) => return e,
        };
        let user = match session_user(state, req) {
            Ok(u) => u,
            Err(e) => return e,
        };
        match db::curricula_get(conn, user, &id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                return err(
                    &req.id,
                    "not_found",
                    "saved curriculum not found",
                    Some(json!({ "id": id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };
    let mut curriculum: Curriculum = match serde_json::from_str(&saved.curriculum_json) {
        Ok(c) => c,
        Err(e) => {
            return err(
                &req.id,
                "db_query_failed",
                format!("stored curriculum is unreadable: {}", e),
                Some(json!({ "id": saved.id })),
            )
        }
    };
    if let Err(e) = curriculum.check() {
        return err(
            &req.id,
            "db_query_failed",
            format!("stored curriculum is invalid: {}", e),
            Some(json!({ "id": saved.id })),
        );
    }
    let result = json!({
        "id": saved.id,
        "name": saved.name,
        "curriculum": curriculum,
    });
    state.session.curriculum = Some(curriculum);
    ok(&req.id, result)
}

fn handle_library_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user = match session_user(state, req) {
        Ok(u) => u,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::curricula_delete(conn, user, &id) {
        Ok(true) => ok(&req.id, json!({ "ok": true })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "saved curriculum not found",
            Some(json!({ "id": id })),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "library.list" => Some(handle_library_list(state, req)),
        "library.save" => Some(handle_library_save(state, req)),
        "library.open" => Some(handle_library_open(state, req)),
        "library.delete" => Some(handle_library_delete(state, req)),
        _ => None,
    }
}
