use crate::model::{Curriculum, CurriculumError, CurriculumItem, FixedSessionKind, ItemOrigin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use thiserror::Error;

pub const EXPORT_FORMAT: &str = "curriculum-export-v1";
pub const EXPORT_VERSION: u32 = 1;
pub const CSV_HEADER: [&str; 7] = [
    "Sequence", "Period", "Activity", "Category", "Type", "Notes", "Guidance",
];

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid curriculum JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer error: {0}")]
    Buffer(String),
    #[error("unsupported export format: {0}")]
    Format(String),
    #[error("checksum mismatch: file records {expected}, content hashes to {actual}")]
    Checksum { expected: String, actual: String },
    #[error("curriculum rejected: {0}")]
    Invalid(#[from] CurriculumError),
}

/// On-disk shape shared by file export and cross-device import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub format: String,
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    pub checksum: String,
    pub curriculum: Curriculum,
}

/// Hex SHA-256 of the compact JSON encoding.
pub fn checksum(curriculum: &Curriculum) -> Result<String, ExchangeError> {
    let bytes = serde_json::to_vec(curriculum)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

pub fn to_json(curriculum: &Curriculum, name: Option<&str>) -> Result<String, ExchangeError> {
    let envelope = ExportEnvelope {
        format: EXPORT_FORMAT.to_string(),
        version: EXPORT_VERSION,
        exported_at: Utc::now(),
        name: name.map(str::to_string),
        checksum: checksum(curriculum)?,
        curriculum: curriculum.clone(),
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

/// Verifies format and checksum, then the curriculum's own invariants.
pub fn from_json(text: &str) -> Result<ExportEnvelope, ExchangeError> {
    let mut envelope: ExportEnvelope = serde_json::from_str(text)?;
    if envelope.format != EXPORT_FORMAT {
        return Err(ExchangeError::Format(envelope.format));
    }
    let actual = checksum(&envelope.curriculum)?;
    if !actual.eq_ignore_ascii_case(&envelope.checksum) {
        return Err(ExchangeError::Checksum {
            expected: envelope.checksum,
            actual,
        });
    }
    envelope.curriculum.check()?;
    Ok(envelope)
}

pub fn write_json(
    path: &Path,
    curriculum: &Curriculum,
    name: Option<&str>,
) -> Result<(), ExchangeError> {
    let text = to_json(curriculum, name)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ExchangeError::Io {
            path: parent.to_string_lossy().to_string(),
            source,
        })?;
    }
    std::fs::write(path, text).map_err(|source| ExchangeError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })
}

pub fn read_json(path: &Path) -> Result<ExportEnvelope, ExchangeError> {
    let text = std::fs::read_to_string(path).map_err(|source| ExchangeError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })?;
    from_json(&text)
}

fn item_type(item: &CurriculumItem) -> String {
    match (item.fixed_session, item.origin) {
        (Some(f), _) => match f.kind {
            FixedSessionKind::Questionnaire => format!("Questionnaire (cycle {})", f.cycle),
            FixedSessionKind::Coaching => format!("Coaching (cycle {})", f.cycle),
        },
        (None, ItemOrigin::Manual) => "Activity (added)".to_string(),
        (None, ItemOrigin::Generated) => "Activity".to_string(),
    }
}

/// One row per item in sequence order. Quoting follows RFC 4180.
pub fn to_csv(curriculum: &Curriculum) -> Result<String, ExchangeError> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(CSV_HEADER)?;
    let mut items: Vec<&CurriculumItem> = curriculum.items.iter().collect();
    items.sort_by_key(|i| i.sequence);
    for item in items {
        wtr.write_record([
            item.sequence.to_string(),
            item.period.label().to_string(),
            item.activity.name.clone(),
            item.activity.category.label().to_string(),
            item_type(item),
            item.notes.clone().unwrap_or_default(),
            item.activity.guidance.clone(),
        ])?;
    }
    let bytes = wtr
        .into_inner()
        .map_err(|e| ExchangeError::Buffer(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExchangeError::Buffer(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::Editor;
    use crate::generator::tests::{academic_catalog, settings};
    use crate::generator::{generate, GeneratorTuning};
    use crate::model::Pathway;

    fn curriculum() -> Curriculum {
        let catalog = academic_catalog(3);
        let mut c = generate(
            &catalog,
            &settings(Pathway::Academic, 2, true),
            &GeneratorTuning::default(),
            Some(5),
        )
        .expect("generate");
        let uid = c.items[3].uid.clone();
        Editor::new(&mut c, &catalog).annotate(&uid, Some("Bring \"roadmap\", pens\nand folders"));
        c
    }

    #[test]
    fn json_roundtrip_is_exact() {
        let c = curriculum();
        let text = to_json(&c, Some("Year 10 plan")).expect("export");
        let back = from_json(&text).expect("import");
        assert_eq!(back.curriculum, c);
        assert_eq!(back.name.as_deref(), Some("Year 10 plan"));
    }

    #[test]
    fn file_roundtrip() {
        let c = curriculum();
        let dir = std::env::temp_dir()
            .join(format!("curriculumd-exchange-{}", uuid::Uuid::new_v4()));
        let path = dir.join("plan.json");
        write_json(&path, &c, None).expect("write");
        let back = read_json(&path).expect("read");
        assert_eq!(back.curriculum, c);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn tampered_export_is_rejected() {
        let c = curriculum();
        let text = to_json(&c, None).expect("export");
        let mut value: serde_json::Value = serde_json::from_str(&text).expect("json");
        value["curriculum"]["items"][0]["sequence"] = serde_json::json!(99);
        let err = from_json(&value.to_string()).expect_err("tampered");
        assert!(matches!(err, ExchangeError::Checksum { .. }));

        value["format"] = serde_json::json!("something-else");
        let err = from_json(&value.to_string()).expect_err("format");
        assert!(matches!(err, ExchangeError::Format(_)));
    }

    #[test]
    fn import_checks_curriculum_behind_a_valid_checksum() {
        let c = curriculum();

        let mut duplicated = c.clone();
        duplicated.items[4].activity = duplicated.items[3].activity.clone();
        let text = to_json(&duplicated, None).expect("export");
        let err = from_json(&text).expect_err("duplicate activity");
        assert!(matches!(
            err,
            ExchangeError::Invalid(CurriculumError::DuplicateActivity(_))
        ));

        let mut oversized = c.clone();
        oversized.settings.items_per_period = 9;
        let err = from_json(&to_json(&oversized, None).expect("export")).expect_err("settings");
        assert!(matches!(err, ExchangeError::Invalid(CurriculumError::Settings(_))));

        let mut gapped = c.clone();
        let last = gapped.items.len() - 1;
        gapped.items[last].sequence = 42;
        let back = from_json(&to_json(&gapped, None).expect("export")).expect("import");
        assert_eq!(back.curriculum, c);
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        let c = curriculum();
        let text = to_csv(&c).expect("csv");
        assert!(text.starts_with("Sequence,Period,Activity,Category,Type,Notes,Guidance"));
        assert!(text.contains("\"Bring \"\"roadmap\"\", pens\nand folders\""));

        let mut rdr = csv::Reader::from_reader(text.as_bytes());
        let rows: Vec<csv::StringRecord> = rdr.records().collect::<Result<_, _>>().expect("parse");
        assert_eq!(rows.len(), c.items.len());
        assert_eq!(&rows[0][0], "1");
        assert_eq!(&rows[0][4], "Questionnaire (cycle 1)");
        assert_eq!(&rows[3][5], "Bring \"roadmap\", pens\nand folders");
    }
}
