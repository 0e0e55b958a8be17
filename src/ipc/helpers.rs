use crate::ipc::error::err;
use crate::ipc::types::{AppState, LoadedCatalog, Request};
use crate::model::Curriculum;
use rusqlite::Connection;
use serde_json::Value;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent and null both read as `None`; any other non-string is rejected.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => Err(err(
            &req.id,
            "bad_params",
            format!("{} must be a string", key),
            None,
        )),
    }
}

pub fn parse_bool(req: &Request, key: &str, default: bool) -> Result<bool, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be boolean", key), None)),
    }
}

/// Seeds travel as JSON numbers or decimal strings; u64 does not fit in
/// every client's number type.
pub fn parse_seed(req: &Request) -> Result<Option<u64>, Value> {
    let bad = || err(&req.id, "bad_params", "seed must be a non-negative integer", None);
    match req.params.get("seed") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(bad),
        Some(Value::String(s)) => s.trim().parse::<u64>().map(Some).map_err(|_| bad()),
        Some(_) => Err(bad()),
    }
}

pub fn session_user<'a>(state: &'a AppState, req: &Request) -> Result<&'a str, Value> {
    state
        .session
        .user
        .as_deref()
        .ok_or_else(|| err(&req.id, "no_user", "call session.setUser first", None))
}

pub fn loaded_catalog<'a>(state: &'a AppState, req: &Request) -> Result<&'a LoadedCatalog, Value> {
    state
        .session
        .catalog
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_catalog", "load the activity catalog first", None))
}

pub fn current_curriculum<'a>(state: &'a AppState, req: &Request) -> Result<&'a Curriculum, Value> {
    state
        .session
        .curriculum
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_curriculum", "generate or open a curriculum first", None))
}
