use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};
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

fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

fn parse_string_array(v: Option<&JsonValue>) -> Result<Vec<String>, &'static str> {
    match v {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of strings")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item
                    .as_str()
                    .ok_or("must be array of strings")?
                    .trim()
                    .to_string();
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            Ok(out)
        }
    }
}

#[derive(Debug, Clone)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    discord_id: Option<String>,
    permissions: Vec<String>,
    settings: Vec<String>,
}

fn json_list(text: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(text).unwrap_or_default()
}

fn load_user(conn: &Connection, email: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, name, email, discord_id, permissions, settings
         FROM users WHERE email = ?",
        [email],
        |row| {
            let permissions: String = row.get(4)?;
            let settings: String = row.get(5)?;
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                discord_id: row.get(3)?,
                permissions: json_list(&permissions),
                settings: json_list(&settings),
            })
        },
    )
    .optional()
}

fn acting_is_admin(conn: &Connection, req: &Request) -> rusqlite::Result<bool> {
    let Some(email) = req
        .params
        .get("actingEmail")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_lowercase())
    else {
        return Ok(false);
    };
    Ok(load_user(conn, &email)?
        .map(|u| u.permissions.iter().any(|p| p == "Admin"))
        .unwrap_or(false))
}

fn user_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let structure = match db::permission_structure(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut stmt = match conn.prepare(
        "SELECT id, name, email, discord_id, permissions, settings FROM users",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let permissions: String = row.get(4)?;
            let settings: String = row.get(5)?;
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                discord_id: row.get(3)?,
                permissions: json_list(&permissions),
                settings: json_list(&settings),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    let mut users = match rows {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Group by role: users sort on their first permission group, users with
    // none fall to the end (lowercase sorts after the group names).
    users.sort_by_key(|u| {
        u.permissions
            .first()
            .cloned()
            .unwrap_or_else(|| "user".to_string())
    });

    let users: Vec<serde_json::Value> = users
        .into_iter()
        .map(|u| {
            let expanded = db::expand_permissions(&structure, &u.permissions);
            json!({
                "id": u.id,
                "name": u.name,
                "email": u.email,
                "discordId": u.discord_id,
                "permissions": u.permissions,
                "permissionsExpanded": expanded,
                "settings": u.settings,
            })
        })
        .collect();

    ok(&req.id, json!({ "users": users }))
}

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };
    let discord_id = req
        .params
        .get("discordId")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let permissions = match parse_string_array(req.params.get("permissions")) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", format!("permissions {e}"), None),
    };

    let total = match user_count(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    // The very first user bootstraps the directory and may self-grant Admin.
    if total > 0 && permissions.iter().any(|p| p == "Admin") {
        match acting_is_admin(conn, req) {
            Ok(true) => {}
            Ok(false) => {
                return err(
                    &req.id,
                    "forbidden",
                    "cannot grant admin permissions",
                    None,
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let user_id = Uuid::new_v4().to_string();
    let permissions_json = json!(permissions).to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, name, email, discord_id, permissions, settings, updated_at)
         VALUES(?, ?, ?, ?, ?, '[]', ?)",
        (
            &user_id,
            &name,
            &email,
            &discord_id,
            &permissions_json,
            now_ts(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    ok(&req.id, json!({ "userId": user_id, "email": email }))
}

fn handle_users_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };

    let target = match load_user(conn, &email) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let acting_email = req
        .params
        .get("actingEmail")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_lowercase());
    let acting_admin = match acting_is_admin(conn, req) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Admin accounts may only be edited by an admin or by themselves.
    let target_is_admin = target.permissions.iter().any(|p| p == "Admin");
    let acting_is_self = acting_email.as_deref() == Some(target.email.as_str());
    if target_is_admin && !acting_admin && !acting_is_self {
        return err(&req.id, "forbidden", "cannot edit an admin user", None);
    }

    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let name = match patch.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => target.name.clone(),
    };
    let discord_id = match patch.get("discordId") {
        Some(JsonValue::Null) => None,
        Some(v) => v
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        None => target.discord_id.clone(),
    };
    let permissions = match patch.get("permissions") {
        Some(v) => match parse_string_array(Some(v)) {
            Ok(list) => list,
            Err(e) => return err(&req.id, "bad_params", format!("permissions {e}"), None),
        },
        None => target.permissions.clone(),
    };
    let settings = match patch.get("settings") {
        Some(v) => match parse_string_array(Some(v)) {
            Ok(list) => list,
            Err(e) => return err(&req.id, "bad_params", format!("settings {e}"), None),
        },
        None => target.settings.clone(),
    };

    if permissions.iter().any(|p| p == "Admin") && !target_is_admin && !acting_admin {
        return err(&req.id, "forbidden", "cannot grant admin permissions", None);
    }

    if let Err(e) = conn.execute(
        "UPDATE users
         SET name = ?, discord_id = ?, permissions = ?, settings = ?, updated_at = ?
         WHERE email = ?",
        (
            &name,
            &discord_id,
            json!(permissions).to_string(),
            json!(settings).to_string(),
            now_ts(),
            &email,
        ),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "email": email, "name": name }))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.to_ascii_lowercase(),
        Err(e) => return e,
    };

    let target = match load_user(conn, &email) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "user not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let acting_email = req
        .params
        .get("actingEmail")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_ascii_lowercase());
    let acting_admin = match acting_is_admin(conn, req) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let target_is_admin = target.permissions.iter().any(|p| p == "Admin");
    let acting_is_self = acting_email.as_deref() == Some(target.email.as_str());
    if target_is_admin && !acting_admin && !acting_is_self {
        return err(&req.id, "forbidden", "cannot delete an admin user", None);
    }

    if let Err(e) = conn.execute("DELETE FROM users WHERE email = ?", [&email]) {
        return err(&req.id, "db_delete_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(handle_users_list(state, req)),
        "users.create" => Some(handle_users_create(state, req)),
        "users.update" => Some(handle_users_update(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        _ => None,
    }
}
