use crate::catalog::{CatalogTables, DEFAULT_ACTIVITY_TABLE, DEFAULT_ASSET_TABLES};
use crate::db;
use crate::generator::GeneratorTuning;
use rusqlite::Connection;
use serde_json::{json, Map, Value};

pub const ENV_CATALOG_URL: &str = "CURRICULUMD_CATALOG_URL";
pub const ENV_CATALOG_KEY: &str = "CURRICULUMD_CATALOG_KEY";

const MAX_ASSET_TABLES: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupSection {
    Catalog,
    Generator,
}

impl SetupSection {
    pub const ALL: [SetupSection; 2] = [SetupSection::Catalog, SetupSection::Generator];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Self::Catalog),
            "generator" => Some(Self::Generator),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Generator => "generator",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Catalog => "setup.catalog",
            Self::Generator => "setup.generator",
        }
    }
}

pub fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Catalog => json!({
            "endpoint": "",
            "apiKey": "",
            "activityTable": DEFAULT_ACTIVITY_TABLE,
            "assetTables": DEFAULT_ASSET_TABLES,
        }),
        SetupSection::Generator => {
            let tuning = GeneratorTuning::default();
            json!({
                "samePeriodPenalty": tuning.same_period_penalty,
                "jitter": tuning.jitter,
            })
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v.as_f64().ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

/// Table names end up in a URL path, so only plain identifiers pass.
fn parse_table_name(v: &Value, key: &str) -> Result<String, String> {
    let s = parse_string_max(v, key, 64)?;
    let valid = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!("{} must be a non-empty identifier", key));
    }
    Ok(s)
}

pub fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Catalog => match k.as_str() {
                "endpoint" => {
                    let s = parse_string_max(v, k, 512)?;
                    if !s.is_empty() && !s.starts_with("https://") && !s.starts_with("http://") {
                        return Err("endpoint must be an http(s) URL".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "apiKey" => {
                    obj.insert(k.clone(), Value::String(parse_string_max(v, k, 4096)?));
                }
                "activityTable" => {
                    obj.insert(k.clone(), Value::String(parse_table_name(v, k)?));
                }
                "assetTables" => {
                    let arr = v
                        .as_array()
                        .ok_or_else(|| "assetTables must be an array".to_string())?;
                    if arr.len() > MAX_ASSET_TABLES {
                        return Err(format!(
                            "assetTables must have <= {} entries",
                            MAX_ASSET_TABLES
                        ));
                    }
                    let mut tables = Vec::with_capacity(arr.len());
                    for t in arr {
                        tables.push(Value::String(parse_table_name(t, k)?));
                    }
                    obj.insert(k.clone(), Value::Array(tables));
                }
                _ => return Err(format!("unknown catalog field: {}", k)),
            },
            SetupSection::Generator => match k.as_str() {
                "samePeriodPenalty" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 0.0, 5.0)?));
                }
                "jitter" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 0.0, 1.0)?));
                }
                _ => return Err(format!("unknown generator field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: a malformed stored value must not block setup.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn save_section(conn: &Connection, section: SetupSection, value: &Value) -> anyhow::Result<()> {
    db::settings_set_json(conn, section.key(), value)
}

fn section_or_default(conn: Option<&Connection>, section: SetupSection) -> anyhow::Result<Value> {
    match conn {
        Some(conn) => load_section(conn, section),
        None => Ok(default_section(section)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConnection {
    pub endpoint: String,
    pub api_key: String,
}

/// Workspace settings win; the environment fills whatever they leave blank.
pub fn catalog_connection(conn: Option<&Connection>) -> anyhow::Result<Option<CatalogConnection>> {
    let section = section_or_default(conn, SetupSection::Catalog)?;
    Ok(resolve_connection(
        &section,
        std::env::var(ENV_CATALOG_URL).ok(),
        std::env::var(ENV_CATALOG_KEY).ok(),
    ))
}

fn resolve_connection(
    section: &Value,
    env_url: Option<String>,
    env_key: Option<String>,
) -> Option<CatalogConnection> {
    let pick = |field: &str, env: Option<String>| -> Option<String> {
        section
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| env.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
    };
    Some(CatalogConnection {
        endpoint: pick("endpoint", env_url)?,
        api_key: pick("apiKey", env_key)?,
    })
}

pub fn catalog_tables(conn: Option<&Connection>) -> anyhow::Result<CatalogTables> {
    let section = section_or_default(conn, SetupSection::Catalog)?;
    let mut tables = CatalogTables::default();
    if let Some(t) = section.get("activityTable").and_then(|v| v.as_str()) {
        tables.activity_table = t.to_string();
    }
    if let Some(arr) = section.get("assetTables").and_then(|v| v.as_array()) {
        tables.asset_tables = arr
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
    }
    Ok(tables)
}

pub fn generator_tuning(conn: Option<&Connection>) -> anyhow::Result<GeneratorTuning> {
    let section = section_or_default(conn, SetupSection::Generator)?;
    let mut tuning = GeneratorTuning::default();
    if let Some(p) = section.get("samePeriodPenalty").and_then(|v| v.as_f64()) {
        tuning.same_period_penalty = p;
    }
    if let Some(j) = section.get("jitter").and_then(|v| v.as_f64()) {
        tuning.jitter = j;
    }
    Ok(tuning)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object")
    }

    #[test]
    fn catalog_patch_validates_fields() {
        let mut cur = default_section(SetupSection::Catalog);
        merge_section_patch(
            SetupSection::Catalog,
            &mut cur,
            &patch(json!({"endpoint": " https://db.example.org ", "assetTables": ["assets"]})),
        )
        .expect("valid patch");
        assert_eq!(cur["endpoint"], "https://db.example.org");
        assert_eq!(cur["assetTables"], json!(["assets"]));

        for bad in [
            json!({"endpoint": "ftp://x"}),
            json!({"activityTable": "acts;drop"}),
            json!({"activityTable": ""}),
            json!({"assetTables": "assets"}),
            json!({"optionalColumn": "pathway"}),
        ] {
            let mut cur = default_section(SetupSection::Catalog);
            assert!(merge_section_patch(SetupSection::Catalog, &mut cur, &patch(bad)).is_err());
        }
    }

    #[test]
    fn generator_patch_enforces_ranges() {
        let mut cur = default_section(SetupSection::Generator);
        merge_section_patch(SetupSection::Generator, &mut cur, &patch(json!({"jitter": 0.0})))
            .expect("zero jitter");
        assert_eq!(cur["jitter"], json!(0.0));
        assert!(merge_section_patch(
            SetupSection::Generator,
            &mut cur,
            &patch(json!({"samePeriodPenalty": 6}))
        )
        .is_err());
    }

    #[test]
    fn environment_fills_blank_connection_fields() {
        let section = default_section(SetupSection::Catalog);
        assert_eq!(resolve_connection(&section, None, None), None);
        assert_eq!(
            resolve_connection(&section, Some("https://env".into()), None),
            None
        );

        let got = resolve_connection(&section, Some("https://env".into()), Some("k".into()))
            .expect("configured");
        assert_eq!(got.endpoint, "https://env");

        let mut section = section;
        section["endpoint"] = json!("https://workspace");
        let got = resolve_connection(&section, Some("https://env".into()), Some("k".into()))
            .expect("configured");
        assert_eq!(got.endpoint, "https://workspace");
        assert_eq!(got.api_key, "k");
    }

    #[test]
    fn defaults_without_workspace() {
        assert_eq!(catalog_tables(None).expect("tables"), CatalogTables::default());
        assert_eq!(generator_tuning(None).expect("tuning"), GeneratorTuning::default());
    }
}
