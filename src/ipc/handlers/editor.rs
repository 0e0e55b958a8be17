use crate::catalog::Catalog;
use crate::editor::{Direction, EditOutcome, Editor};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{Category, Period};
use serde_json::{json, Value};
use tracing::info;

/// Runs `op` against the session curriculum. Without a loaded catalog the
/// editor sees an empty one, so reordering and notes still work on imported
/// or reopened curricula.
fn with_editor<R, F>(state: &mut AppState, req: &Request, op: F) -> Result<R, Value>
where
    F: FnOnce(&mut Editor<'_>) -> R,
{
    let empty = Catalog::default();
    let session = &mut state.session;
    let catalog = session
        .catalog
        .as_ref()
        .map(|l| &l.catalog)
        .unwrap_or(&empty);
    let Some(curriculum) = session.curriculum.as_mut() else {
        return Err(err(
            &req.id,
            "no_curriculum",
            "generate or open a curriculum first",
            None,
        ));
    };
    let mut editor = Editor::new(curriculum, catalog);
    Ok(op(&mut editor))
}

fn edit<F>(state: &mut AppState, req: &Request, op: F) -> Value
where
    F: FnOnce(&mut Editor<'_>) -> EditOutcome,
{
    let outcome = match with_editor(state, req, op) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let reason = outcome.reason().map(|r| r.code());
    if let Some(code) = reason {
        info!(method = %req.method, reason = code, "edit rejected");
    }
    ok(
        &req.id,
        json!({
            "changed": outcome.changed(),
            "reason": reason,
            "curriculum": state.session.curriculum,
        }),
    )
}

fn candidates<F>(state: &mut AppState, req: &Request, list: F) -> Value
where
    F: FnOnce(&Editor<'_>) -> Value,
{
    let activities = match with_editor(state, req, |editor| list(&*editor)) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let count = activities.as_array().map(|a| a.len()).unwrap_or(0);
    ok(&req.id, json!({ "count": count, "activities": activities }))
}

fn required_period(req: &Request) -> Result<Period, Value> {
    let raw = required_str(req, "period")?;
    Period::parse(&raw)
        .ok_or_else(|| err(&req.id, "bad_params", format!("unknown period: {}", raw), None))
}

fn handle_move_within_period(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let direction = match required_str(req, "direction") {
        Ok(raw) => match Direction::parse(&raw) {
            Some(d) => d,
            None => return err(&req.id, "bad_params", "direction must be up or down", None),
        },
        Err(e) => return e,
    };
    edit(state, req, |e| e.move_within_period(&uid, direction))
}

fn handle_remove(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.remove(&uid))
}

fn handle_add(state: &mut AppState, req: &Request) -> Value {
    let activity_id = match required_str(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period = match required_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before = match optional_str(req, "beforeUid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.add(&activity_id, period, before.as_deref()))
}

fn handle_quick_add(state: &mut AppState, req: &Request) -> Value {
    let activity_id = match required_str(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.quick_add(&activity_id))
}

fn handle_move_to_period(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let period = match required_period(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let before = match optional_str(req, "beforeUid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.move_to_period(&uid, period, before.as_deref()))
}

fn handle_swap(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity_id = match required_str(req, "activityId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.swap(&uid, &activity_id))
}

fn handle_swap_candidates(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    candidates(state, req, |e| json!(e.swap_candidates(&uid)))
}

fn handle_add_candidates(state: &mut AppState, req: &Request) -> Value {
    let category = match optional_str(req, "category") {
        Ok(None) => None,
        Ok(Some(raw)) => match Category::parse(&raw) {
            Some(c) => Some(c),
            None => {
                return err(
                    &req.id,
                    "bad_params",
                    format!("unknown category: {}", raw),
                    None,
                )
            }
        },
        Err(e) => return e,
    };
    candidates(state, req, |e| json!(e.add_candidates(category)))
}

fn handle_annotate(state: &mut AppState, req: &Request) -> Value {
    let uid = match required_str(req, "uid") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let notes = match optional_str(req, "notes") {
        Ok(v) => v,
        Err(e) => return e,
    };
    edit(state, req, |e| e.annotate(&uid, notes.as_deref()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "editor.moveWithinPeriod" => Some(handle_move_within_period(state, req)),
        "editor.remove" => Some(handle_remove(state, req)),
        "editor.add" => Some(handle_add(state, req)),
        "editor.quickAdd" => Some(handle_quick_add(state, req)),
        "editor.moveToPeriod" => Some(handle_move_to_period(state, req)),
        "editor.swap" => Some(handle_swap(state, req)),
        "editor.swapCandidates" => Some(handle_swap_candidates(state, req)),
        "editor.addCandidates" => Some(handle_add_candidates(state, req)),
        "editor.annotate" => Some(handle_annotate(state, req)),
        _ => None,
    }
}
