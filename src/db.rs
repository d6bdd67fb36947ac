use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::path::Path;

use crate::schedule::ProgramStatus;

pub const DB_FILE: &str = "portal.sqlite3";

/// Default permission groups, seeded into the settings store on first open so
/// a unit can edit them without a rebuild.
fn default_permission_structure() -> Value {
    json!({
        "Admin": [
            "view_users",
            "manage_users",
            "manage_training_program",
            "manage_lesson_plans",
            "manage_documents"
        ],
        "Training": ["manage_training_program", "manage_lesson_plans"],
        "Duty NCO": ["view_users"],
        "User": []
    })
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            permissions TEXT NOT NULL DEFAULT '[]',
            settings TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS training_programs(
            name TEXT PRIMARY KEY,
            active INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS syllabus_entries(
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL UNIQUE,
            file_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before the Discord integration lack this column.
    ensure_users_discord_id(&conn)?;

    if settings_get_json(&conn, "permissions.structure")?.is_none() {
        settings_set_json(&conn, "permissions.structure", &default_permission_structure())?;
    }

    Ok(conn)
}

fn ensure_users_discord_id(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "discord_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN discord_id TEXT", [])?;
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

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &text),
    )?;
    Ok(())
}

pub fn permission_structure(conn: &Connection) -> anyhow::Result<Map<String, Value>> {
    let stored = settings_get_json(conn, "permissions.structure")?
        .unwrap_or_else(default_permission_structure);
    Ok(stored.as_object().cloned().unwrap_or_default())
}

/// Union of the structure's per-group permission lists, duplicates removed,
/// in group order. Unknown groups contribute nothing.
pub fn expand_permissions(structure: &Map<String, Value>, groups: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for group in groups {
        let Some(list) = structure.get(group).and_then(|v| v.as_array()) else {
            continue;
        };
        for perm in list {
            if let Some(perm) = perm.as_str() {
                if !out.iter().any(|p| p == perm) {
                    out.push(perm.to_string());
                }
            }
        }
    }
    out
}

pub fn program_registry(conn: &Connection) -> anyhow::Result<Vec<ProgramStatus>> {
    let mut stmt = conn.prepare("SELECT name, active FROM training_programs ORDER BY name")?;
    let rows = stmt
        .query_map([], |row| {
            let name: String = row.get(0)?;
            let active: i64 = row.get(1)?;
            Ok(ProgramStatus {
                name,
                active: active != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_program_active(conn: &Connection, name: &str, active: bool) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO training_programs(name, active) VALUES(?, ?)
         ON CONFLICT(name) DO UPDATE SET active = excluded.active",
        (name, active as i64),
    )?;
    Ok(())
}

pub fn register_program(conn: &Connection, name: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO training_programs(name, active) VALUES(?, 0)",
        [name],
    )?;
    Ok(())
}

pub fn remove_program_entry(conn: &Connection, name: &str) -> anyhow::Result<bool> {
    let affected = conn.execute("DELETE FROM training_programs WHERE name = ?", [name])?;
    Ok(affected > 0)
}
