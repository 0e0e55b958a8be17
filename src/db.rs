use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

pub const DB_FILE: &str = "curriculum.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS saved_curricula(
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            name TEXT NOT NULL,
            curriculum_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(owner, name)
        )",
        [],
    )?;

    // Files written before the library listing showed sizes lack item_count.
    ensure_saved_curricula_item_count(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_saved_curricula_owner ON saved_curricula(owner, updated_at)",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(text) => Ok(Some(
            serde_json::from_str(&text)
                .with_context(|| format!("setting {} is not valid JSON", key))?,
        )),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedSummary {
    pub id: String,
    pub name: String,
    pub item_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct SavedCurriculum {
    pub id: String,
    pub name: String,
    pub curriculum_json: String,
}

/// Most recently updated first.
pub fn curricula_list(conn: &Connection, owner: &str) -> anyhow::Result<Vec<SavedSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, item_count, created_at, updated_at
         FROM saved_curricula
         WHERE owner = ?
         ORDER BY updated_at DESC, name",
    )?;
    let rows = stmt
        .query_map([owner], |row| {
            Ok(SavedSummary {
                id: row.get(0)?,
                name: row.get(1)?,
                item_count: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn curricula_get(
    conn: &Connection,
    owner: &str,
    id: &str,
) -> anyhow::Result<Option<SavedCurriculum>> {
    let row = conn
        .query_row(
            "SELECT id, name, curriculum_json FROM saved_curricula WHERE owner = ? AND id = ?",
            [owner, id],
            |row| {
                Ok(SavedCurriculum {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    curriculum_json: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// Upsert by explicit id, else by (owner, name), else insert a new row.
/// Returns the id written and whether a new row was created.
pub fn curricula_save(
    conn: &Connection,
    owner: &str,
    id: Option<&str>,
    name: &str,
    curriculum_json: &str,
    item_count: usize,
) -> anyhow::Result<(String, bool)> {
    let now = Utc::now().to_rfc3339();

    let existing: Option<String> = match id {
        Some(id) => conn
            .query_row(
                "SELECT id FROM saved_curricula WHERE owner = ? AND id = ?",
                [owner, id],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id FROM saved_curricula WHERE owner = ? AND name = ?",
                [owner, name],
                |row| row.get(0),
            )
            .optional()?,
    };

    if let Some(existing_id) = existing {
        conn.execute(
            "UPDATE saved_curricula
             SET name = ?, curriculum_json = ?, item_count = ?, updated_at = ?
             WHERE id = ?",
            params![name, curriculum_json, item_count as i64, now, existing_id],
        )
        .context("saved curriculum name already used")?;
        return Ok((existing_id, false));
    }

    let new_id = match id {
        Some(id) => id.to_string(),
        None => uuid::Uuid::new_v4().to_string(),
    };
    conn.execute(
        "INSERT INTO saved_curricula(id, owner, name, curriculum_json, item_count, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        params![new_id, owner, name, curriculum_json, item_count as i64, now, now],
    )
    .context("saved curriculum name already used")?;
    Ok((new_id, true))
}

pub fn curricula_delete(conn: &Connection, owner: &str, id: &str) -> anyhow::Result<bool> {
    let n = conn.execute(
        "DELETE FROM saved_curricula WHERE owner = ? AND id = ?",
        [owner, id],
    )?;
    Ok(n > 0)
}

fn ensure_saved_curricula_item_count(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "saved_curricula", "item_count")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE saved_curricula ADD COLUMN item_count INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill from the stored JSON. Unparseable rows keep 0.
    let mut stmt = conn.prepare("SELECT id, curriculum_json FROM saved_curricula")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (id, text) in rows {
        let count = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("items").and_then(|i| i.as_array()).map(|a| a.len()))
            .unwrap_or(0);
        conn.execute(
            "UPDATE saved_curricula SET item_count = ? WHERE id = ?",
            (count as i64, id),
        )?;
    }
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
