use crate::model::{Activity, AssetKind, AssetRef, Category, CurriculumSettings, Level, Pathway};
use reqwest::blocking::Client;
use reqwest::header;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_ACTIVITY_TABLE: &str = "activities";
pub const DEFAULT_ASSET_TABLES: [&str; 2] = ["activity_assets", "activity_translations"];

/// Columns every deployment of the activity table carries.
pub const BASE_COLUMNS: [&str; 8] = [
    "id",
    "name",
    "category",
    "level",
    "summary",
    "guidance",
    "document_url",
    "slides_url",
];
/// Added later; older tables reject queries that name it.
pub const OPTIONAL_COLUMN: &str = "pathway";
pub const ASSET_COLUMNS: [&str; 4] = ["activity_id", "kind", "url", "language"];

const BAD_TEXT_VALUES: [&str; 8] = [
    "undefined",
    "null",
    "none",
    "nan",
    "[object object]",
    "#error!",
    "#n/a",
    "#value!",
];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog source is not configured")]
    NotConfigured,
    #[error("catalog request failed: {0}")]
    Request(String),
    #[error("catalog request to `{table}` rejected with status {status}: {body}")]
    Rejected {
        table: String,
        status: u16,
        body: String,
    },
    #[error("catalog payload for `{0}` is not an array of rows")]
    Payload(String),
    #[error("failed to read catalog file {path}: {message}")]
    File { path: String, message: String },
    #[error("catalog unavailable: {first}; retry without `{column}` failed: {second}")]
    Unavailable {
        column: String,
        first: Box<CatalogError>,
        second: Box<CatalogError>,
    },
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        Self::Request(e.to_string())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("catalog row is not an object")]
    NotAnObject,
    #[error("activity {id}: missing category")]
    MissingCategory { id: String },
    #[error("activity {id}: unknown category `{raw}`")]
    Category { id: String, raw: String },
    #[error("activity {id}: unknown level `{raw}`")]
    Level { id: String, raw: String },
    #[error("activity {id}: unknown pathway `{raw}`")]
    Pathway { id: String, raw: String },
}

/// Anything that can answer a column-projected table read.
pub trait CatalogSource {
    fn fetch_rows(&self, table: &str, columns: &[&str]) -> Result<Vec<Value>, CatalogError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTables {
    pub activity_table: String,
    pub asset_tables: Vec<String>,
}

impl Default for CatalogTables {
    fn default() -> Self {
        Self {
            activity_table: DEFAULT_ACTIVITY_TABLE.to_string(),
            asset_tables: DEFAULT_ASSET_TABLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Activities in load order with an id index. Ids are unique.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    activities: Vec<Activity>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn from_activities<I: IntoIterator<Item = Activity>>(activities: I) -> Self {
        let mut catalog = Self::default();
        for a in activities {
            catalog.insert(a);
        }
        catalog
    }

    /// Returns false (and keeps the existing entry) when the id is already present.
    pub fn insert(&mut self, activity: Activity) -> bool {
        if self.index.contains_key(&activity.id) {
            return false;
        }
        self.index
            .insert(activity.id.clone(), self.activities.len());
        self.activities.push(activity);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Activity> {
        self.index.get(id).map(|&i| &self.activities[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter()
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn eligible<'a>(
        &'a self,
        settings: &'a CurriculumSettings,
    ) -> impl Iterator<Item = &'a Activity> + 'a {
        self.activities.iter().filter(move |a| a.is_eligible(settings))
    }

    fn merge_asset(&mut self, activity_id: &str, asset: AssetRef) -> bool {
        let Some(&i) = self.index.get(activity_id) else {
            return false;
        };
        let activity = &mut self.activities[i];
        if activity.assets.iter().any(|a| a.url == asset.url) {
            return false;
        }
        activity.assets.push(asset);
        true
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub rows_received: usize,
    pub loaded: usize,
    pub discarded_without_id: usize,
    pub duplicates: usize,
    pub rejected: Vec<String>,
    pub used_fallback: bool,
    pub asset_table: Option<String>,
    pub assets_merged: usize,
}

#[derive(Debug)]
pub struct CatalogLoad {
    pub catalog: Catalog,
    pub report: LoadReport,
}

/// Fetch, decode and normalize the activity catalog.
///
/// The first query names [`OPTIONAL_COLUMN`]. If the source rejects it for
/// any reason the query is retried once without that column and every
/// activity falls back to `Pathway::Both`. Two failures are fatal.
///
/// Asset links are merged afterwards from the first asset table that
/// answers. That step never fails the load.
pub fn load_catalog(
    source: &dyn CatalogSource,
    tables: &CatalogTables,
) -> Result<CatalogLoad, CatalogError> {
    let mut report = LoadReport::default();
    let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
    columns.push(OPTIONAL_COLUMN);

    let rows = match source.fetch_rows(&tables.activity_table, &columns) {
        Ok(rows) => rows,
        Err(first) => {
            warn!(
                table = %tables.activity_table,
                column = OPTIONAL_COLUMN,
                error = %first,
                "catalog query rejected; retrying without optional column"
            );
            report.used_fallback = true;
            match source.fetch_rows(&tables.activity_table, &BASE_COLUMNS) {
                Ok(rows) => rows,
                Err(second) => {
                    return Err(CatalogError::Unavailable {
                        column: OPTIONAL_COLUMN.to_string(),
                        first: Box::new(first),
                        second: Box::new(second),
                    })
                }
            }
        }
    };

    report.rows_received = rows.len();
    let mut catalog = Catalog::default();
    for row in &rows {
        match decode_activity(row) {
            Ok(Some(activity)) => {
                if !catalog.insert(activity) {
                    report.duplicates += 1;
                }
            }
            Ok(None) => report.discarded_without_id += 1,
            Err(e) => {
                debug!(error = %e, "rejecting catalog row");
                report.rejected.push(e.to_string());
            }
        }
    }
    report.loaded = catalog.len();

    merge_assets(source, tables, &mut catalog, &mut report);

    info!(
        loaded = report.loaded,
        rejected = report.rejected.len(),
        fallback = report.used_fallback,
        assets = report.assets_merged,
        "activity catalog loaded"
    );
    Ok(CatalogLoad { catalog, report })
}

fn merge_assets(
    source: &dyn CatalogSource,
    tables: &CatalogTables,
    catalog: &mut Catalog,
    report: &mut LoadReport,
) {
    for table in &tables.asset_tables {
        let rows = match source.fetch_rows(table, &ASSET_COLUMNS) {
            Ok(rows) => rows,
            Err(e) => {
                debug!(table = %table, error = %e, "asset table unavailable");
                continue;
            }
        };
        report.asset_table = Some(table.clone());
        for row in &rows {
            if let Some((activity_id, asset)) = decode_asset(row) {
                if catalog.merge_asset(&activity_id, asset) {
                    report.assets_merged += 1;
                }
            }
        }
        return;
    }
    warn!("no asset table responded; continuing without extra asset links");
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ActivityRow {
    #[serde(deserialize_with = "lenient_text")]
    id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    category: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    level: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pathway: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    summary: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    guidance: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    document_url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    slides_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssetRow {
    #[serde(deserialize_with = "lenient_text")]
    activity_id: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    kind: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    language: Option<String>,
}

/// Decode one raw row. `Ok(None)` means the row has no id and is dropped.
pub fn decode_activity(row: &Value) -> Result<Option<Activity>, DecodeError> {
    if !row.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let row = ActivityRow::deserialize(row).map_err(|_| DecodeError::NotAnObject)?;
    let Some(id) = clean_text(row.id) else {
        return Ok(None);
    };

    let Some(raw_category) = clean_text(row.category) else {
        return Err(DecodeError::MissingCategory { id });
    };
    let Some(category) = Category::parse(&raw_category) else {
        return Err(DecodeError::Category {
            id,
            raw: raw_category,
        });
    };

    let level = match clean_text(row.level) {
        None => None,
        Some(raw) => match Level::parse_tag(&raw) {
            Some(l) => l,
            None => return Err(DecodeError::Level { id, raw }),
        },
    };

    let pathway = match clean_text(row.pathway) {
        None => Pathway::Both,
        Some(raw) => match Pathway::parse(&raw) {
            Some(p) => p,
            None => return Err(DecodeError::Pathway { id, raw }),
        },
    };

    let name = clean_text(row.name)
        .map(|n| normalize_name(&n))
        .unwrap_or_else(|| id.clone());

    let mut assets = Vec::new();
    if let Some(url) = clean_url(row.document_url) {
        assets.push(AssetRef {
            kind: AssetKind::Document,
            url,
            language: None,
        });
    }
    if let Some(url) = clean_url(row.slides_url) {
        assets.push(AssetRef {
            kind: AssetKind::Slides,
            url,
            language: None,
        });
    }

    Ok(Some(Activity {
        id,
        name,
        category,
        level,
        pathway,
        summary: clean_text(row.summary).unwrap_or_default(),
        guidance: clean_text(row.guidance).unwrap_or_default(),
        assets,
    }))
}

fn decode_asset(row: &Value) -> Option<(String, AssetRef)> {
    let row = AssetRow::deserialize(row).ok()?;
    let activity_id = clean_text(row.activity_id)?;
    let url = clean_url(row.url)?;
    let kind = clean_text(row.kind)
        .map(|k| AssetKind::parse(&k))
        .unwrap_or(AssetKind::Link);
    Some((
        activity_id,
        AssetRef {
            kind,
            url,
            language: clean_text(row.language).map(|l| l.to_ascii_lowercase()),
        },
    ))
}

fn is_bad_value(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    BAD_TEXT_VALUES.contains(&lower.as_str()) || lower.starts_with("error:")
}

/// Trim, and drop empties plus the placeholder strings the host leaks into text fields.
pub fn clean_text(raw: Option<String>) -> Option<String> {
    let s = raw?.trim().to_string();
    if s.is_empty() || is_bad_value(&s) {
        None
    } else {
        Some(s)
    }
}

fn clean_url(raw: Option<String>) -> Option<String> {
    clean_text(raw).filter(|u| u.starts_with("http://") || u.starts_with("https://"))
}

fn strip_labelled_prefix<'a>(s: &'a str, label: &str) -> Option<&'a str> {
    let head = s.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let rest = s[label.len()..].trim_start();
    let sep = rest.chars().next()?;
    if matches!(sep, ':' | '-' | '–' | '|') {
        Some(rest[sep.len_utf8()..].trim_start())
    } else {
        None
    }
}

/// Strip legacy title decorations: `[tag]`, `VESPA Activity:`, `Activity -`,
/// and a leading category label followed by a separator.
pub fn normalize_name(raw: &str) -> String {
    let mut s = raw.trim();
    loop {
        let before = s;
        if s.starts_with('[') {
            if let Some(end) = s.find(']') {
                s = s[end + 1..].trim_start();
            }
        }
        for label in ["VESPA Activity", "Activity"] {
            if let Some(rest) = strip_labelled_prefix(s, label) {
                s = rest;
            }
        }
        for c in Category::ALL {
            if let Some(rest) = strip_labelled_prefix(s, c.label()) {
                s = rest;
            }
        }
        if s == before {
            break;
        }
    }
    if s.is_empty() {
        raw.trim().to_string()
    } else {
        s.to_string()
    }
}

/// PostgREST-style endpoint authenticated with a bearer key.
pub struct HttpCatalogSource {
    base_url: String,
    client: Client,
}

impl HttpCatalogSource {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, CatalogError> {
        let mut headers = header::HeaderMap::new();
        let key = header::HeaderValue::from_str(api_key)
            .map_err(|e| CatalogError::Request(format!("invalid api key: {}", e)))?;
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| CatalogError::Request(format!("invalid api key: {}", e)))?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);

        // No client-side timeout: the caller shows a loading state until the request settles.
        let client = Client::builder()
            .default_headers(headers)
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch_rows(&self, table: &str, columns: &[&str]) -> Result<Vec<Value>, CatalogError> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let select = columns.join(",");
        let mut query = vec![("select", select.as_str())];
        if columns.contains(&"id") {
            query.push(("order", "id.asc"));
        }
        debug!(url = %url, select = %select, "fetching catalog rows");

        let response = self.client.get(&url).query(&query).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CatalogError::Rejected {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        match response.json::<Value>()? {
            Value::Array(rows) => Ok(rows),
            _ => Err(CatalogError::Payload(table.to_string())),
        }
    }
}

/// Offline catalog: a JSON object mapping table names to row arrays.
/// A bare array is read as the default activity table.
///
/// Baseline columns are nullable and may be missing from a file. Any other
/// requested column must appear on at least one row of a non-empty table,
/// otherwise the request is rejected the way the remote schema would reject
/// an unknown column.
pub struct FileCatalogSource {
    tables: Map<String, Value>,
}

impl FileCatalogSource {
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let file_err = |message: String| CatalogError::File {
            path: path.to_string_lossy().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_err(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| file_err(e.to_string()))?;
        Self::from_value(value)
            .ok_or_else(|| file_err("expected an object of tables or an array of rows".into()))
    }

    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(tables) => Some(Self { tables }),
            Value::Array(rows) => {
                let mut tables = Map::new();
                tables.insert(DEFAULT_ACTIVITY_TABLE.to_string(), Value::Array(rows));
                Some(Self { tables })
            }
            _ => None,
        }
    }
}

impl CatalogSource for FileCatalogSource {
    fn fetch_rows(&self, table: &str, columns: &[&str]) -> Result<Vec<Value>, CatalogError> {
        let Some(rows) = self.tables.get(table) else {
            return Err(CatalogError::Rejected {
                table: table.to_string(),
                status: 404,
                body: format!("relation \"{}\" does not exist", table),
            });
        };
        let Some(rows) = rows.as_array() else {
            return Err(CatalogError::Payload(table.to_string()));
        };
        if !rows.is_empty() {
            let missing = columns.iter().copied().find(|c| {
                !BASE_COLUMNS.contains(c)
                    && !ASSET_COLUMNS.contains(c)
                    && rows.iter().all(|row| row.get(*c).is_none())
            });
            if let Some(column) = missing {
                return Err(CatalogError::Rejected {
                    table: table.to_string(),
                    status: 400,
                    body: format!("column {}.{} does not exist", table, column),
                });
            }
        }
        Ok(rows
            .iter()
            .map(|row| match row.as_object() {
                Some(obj) => Value::Object(
                    columns
                        .iter()
                        .filter_map(|c| obj.get(*c).map(|v| (c.to_string(), v.clone())))
                        .collect(),
                ),
                None => row.clone(),
            })
            .collect())
    }
}
