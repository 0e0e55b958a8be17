use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::catalog::{Catalog, LoadReport};
use crate::model::Curriculum;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct LoadedCatalog {
    pub catalog: Catalog,
    pub report: LoadReport,
    /// "remote" or the imported file path.
    pub origin: String,
}

/// Per-process working state. Nothing here is persisted until the host
/// asks for it through `library.*` or `exchange.*`.
#[derive(Default)]
pub struct Session {
    pub user: Option<String>,
    pub catalog: Option<LoadedCatalog>,
    pub curriculum: Option<Curriculum>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
}
