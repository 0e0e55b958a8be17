use crate::config;
use crate::generator::{self, BalanceReport};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{current_curriculum, loaded_catalog, parse_seed};
use crate::ipc::types::{AppState, Request};
use crate::model::{Curriculum, CurriculumSettings};
use serde_json::json;
use tracing::info;

fn curriculum_result(curriculum: &Curriculum, balance: &BalanceReport) -> serde_json::Value {
    json!({
        "curriculum": curriculum,
        "seed": curriculum.seed.to_string(),
        "count": curriculum.items.len(),
        "requested": curriculum.settings.requested_slots(),
        "complete": curriculum.items.len() >= curriculum.settings.requested_slots(),
        "balance": balance,
    })
}

fn parse_settings(req: &Request) -> Result<Option<CurriculumSettings>, serde_json::Value> {
    match req.params.get("settings") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(raw) => serde_json::from_value::<CurriculumSettings>(raw.clone())
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", format!("settings: {}", e), None)),
    }
}

/// Replaces the session curriculum with a fresh run.
fn run_generation(
    state: &mut AppState,
    req: &Request,
    settings: CurriculumSettings,
    seed: Option<u64>,
) -> serde_json::Value {
    let loaded = match loaded_catalog(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let tuning = match config::generator_tuning(state.db.as_ref()) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let curriculum = match generator::generate(&loaded.catalog, &settings, &tuning, seed) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let balance = generator::balance(&curriculum);
    let result = curriculum_result(&curriculum, &balance);
    state.session.curriculum = Some(curriculum);
    ok(&req.id, result)
}

fn handle_curriculum_generate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match parse_settings(req) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "bad_params", "missing settings", None),
        Err(e) => return e,
    };
    let seed = match parse_seed(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    run_generation(state, req, settings, seed)
}

/// Discards the current curriculum, edits included, and generates again.
/// Without `settings` the previous run's settings are reused.
fn handle_curriculum_rebuild(state: &mut AppState, req: &Request) -> serde_json::Value {
    let explicit = match parse_settings(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let settings = match explicit {
        Some(s) => s,
        None => match current_curriculum(state, req) {
            Ok(c) => c.settings.clone(),
            Err(e) => return e,
        },
    };
    let seed = match parse_seed(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some(previous) = state.session.curriculum.as_ref() {
        info!(
            items = previous.items.len(),
            seed = previous.seed,
            "discarding curriculum for rebuild"
        );
    }
    run_generation(state, req, settings, seed)
}

fn handle_curriculum_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let curriculum = match current_curriculum(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let balance = generator::balance(curriculum);
    ok(&req.id, curriculum_result(curriculum, &balance))
}

fn handle_curriculum_balance(state: &mut AppState, req: &Request) -> serde_json::Value {
    let curriculum = match current_curriculum(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    ok(&req.id, json!(generator::balance(curriculum)))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.generate" => Some(handle_curriculum_generate(state, req)),
        "curriculum.rebuild" => Some(handle_curriculum_rebuild(state, req)),
        "curriculum.get" => Some(handle_curriculum_get(state, req)),
        "curriculum.balance" => Some(handle_curriculum_balance(state, req)),
        _ => None,
    }
}
