use crate::catalog::{
    self, CatalogError, CatalogLoad, CatalogSource, FileCatalogSource, HttpCatalogSource,
};
use crate::config;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{loaded_catalog, optional_str, parse_bool, required_str};
use crate::ipc::types::{AppState, LoadedCatalog, Request};
use crate::model::{Category, CurriculumSettings};
use serde_json::json;
use std::path::PathBuf;
use tracing::warn;

fn load_into_session(
    state: &mut AppState,
    req: &Request,
    source: &dyn CatalogSource,
    origin: String,
) -> serde_json::Value {
    let tables = match config::catalog_tables(state.db.as_ref()) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let CatalogLoad { catalog, report } = match catalog::load_catalog(source, &tables) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, origin = %origin, "catalog load failed");
            return err(
                &req.id,
                "catalog_unavailable",
                e.to_string(),
                Some(json!({ "table": tables.activity_table })),
            );
        }
    };

    let result = json!({
        "origin": origin,
        "count": catalog.len(),
        "report": report,
    });
    state.session.catalog = Some(LoadedCatalog {
        catalog,
        report,
        origin,
    });
    ok(&req.id, result)
}

fn handle_catalog_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let connection = match config::catalog_connection(state.db.as_ref()) {
        Ok(Some(c)) => c,
        Ok(None) => {
            return err(
                &req.id,
                "catalog_not_configured",
                CatalogError::NotConfigured.to_string(),
                Some(json!({
                    "env": [config::ENV_CATALOG_URL, config::ENV_CATALOG_KEY]
                })),
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let source = match HttpCatalogSource::new(&connection.endpoint, &connection.api_key) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "catalog_unavailable", e.to_string(), None),
    };
    load_into_session(state, req, &source, "remote".to_string())
}

fn handle_catalog_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let file = PathBuf::from(&path);
    if !file.is_file() {
        return err(
            &req.id,
            "not_found",
            "catalog file not found",
            Some(json!({ "path": path })),
        );
    }
    let source = match FileCatalogSource::open(&file) {
        Ok(s) => s,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "path": path })),
            )
        }
    };
    load_into_session(state, req, &source, path)
}

fn handle_catalog_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let loaded = match loaded_catalog(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
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
    let eligible_only = match parse_bool(req, "eligibleOnly", false) {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Eligibility is judged against explicit settings, else the current curriculum's.
    let settings: Option<CurriculumSettings> = if eligible_only {
        match req.params.get("settings") {
            Some(raw) if !raw.is_null() => {
                match serde_json::from_value::<CurriculumSettings>(raw.clone()) {
                    Ok(s) => Some(s),
                    Err(e) => return err(&req.id, "bad_params", format!("settings: {}", e), None),
                }
            }
            _ => match state.session.curriculum.as_ref() {
                Some(c) => Some(c.settings.clone()),
                None => {
                    return err(
                        &req.id,
                        "bad_params",
                        "eligibleOnly needs settings or a current curriculum",
                        None,
                    )
                }
            },
        }
    } else {
        None
    };

    let activities: Vec<_> = loaded
        .catalog
        .iter()
        .filter(|a| category.map_or(true, |c| a.category == c))
        .filter(|a| settings.as_ref().map_or(true, |s| a.is_eligible(s)))
        .collect();

    ok(
        &req.id,
        json!({
            "origin": loaded.origin,
            "count": activities.len(),
            "activities": activities,
            "report": loaded.report,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.load" => Some(handle_catalog_load(state, req)),
        "catalog.import" => Some(handle_catalog_import(state, req)),
        "catalog.list" => Some(handle_catalog_list(state, req)),
        _ => None,
    }
}
