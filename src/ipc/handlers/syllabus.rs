use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_syllabus_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn
        .prepare("SELECT id, label, file_name FROM syllabus_entries ORDER BY label")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let label: String = row.get(1)?;
            let file_name: String = row.get(2)?;
            Ok(json!({ "id": id, "label": label, "fileName": file_name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_syllabus_put(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let label = match required_str(req, "label") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let file_name = match required_str(req, "fileName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO syllabus_entries(id, label, file_name) VALUES(?, ?, ?)
         ON CONFLICT(label) DO UPDATE SET file_name = excluded.file_name",
        (&id, &label, &file_name),
    ) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "label": label, "fileName": file_name }))
}

fn handle_syllabus_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let label = match required_str(req, "label") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let affected = match conn.execute("DELETE FROM syllabus_entries WHERE label = ?", [&label]) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if affected == 0 {
        return err(&req.id, "not_found", "syllabus entry not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

/// Exact-label lookup from a schedule cell's activity text to its lesson-plan
/// file. No prefix-stripping guesswork: a cell either references an entry or
/// it resolves to null.
fn handle_syllabus_resolve(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let activity = match required_str(req, "activity") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let file_name: Option<String> = match conn
        .query_row(
            "SELECT file_name FROM syllabus_entries WHERE label = ?",
            [&activity],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "activity": activity, "fileName": file_name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "syllabus.list" => Some(handle_syllabus_list(state, req)),
        "syllabus.put" => Some(handle_syllabus_put(state, req)),
        "syllabus.delete" => Some(handle_syllabus_delete(state, req)),
        "syllabus.resolve" => Some(handle_syllabus_resolve(state, req)),
        _ => None,
    }
}
