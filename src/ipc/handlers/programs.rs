use crate::db;
use crate::ipc::error::{err, err_engine, ok};
use crate::ipc::types::{AppState, Request};
use crate::programs::{self, ProgramStore};
use crate::schedule::{self, ProgramStatus};
use rusqlite::Connection;
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn workspace_store(state: &AppState, req: &Request) -> Result<ProgramStore, serde_json::Value> {
    state
        .workspace
        .as_ref()
        .map(|w| ProgramStore::new(w))
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

fn handle_programs_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match workspace_store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let files = match store.list() {
        Ok(v) => v,
        Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
    };
    let registry = match db::program_registry(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let mut names: Vec<String> = files.clone();
    for entry in &registry {
        if !names.contains(&entry.name) {
            names.push(entry.name.clone());
        }
    }
    names.sort();

    let candidates: Vec<ProgramStatus> = registry
        .iter()
        .filter(|p| files.contains(&p.name))
        .cloned()
        .collect();
    let default_program = schedule::select_active_program(&candidates, None).ok();

    let programs: Vec<serde_json::Value> = names
        .iter()
        .map(|name| {
            let active = registry
                .iter()
                .find(|p| &p.name == name)
                .map(|p| p.active)
                .unwrap_or(false);
            json!({
                "name": name,
                "active": active,
                "hasFile": files.contains(name),
            })
        })
        .collect();

    ok(
        &req.id,
        json!({ "programs": programs, "defaultProgram": default_program }),
    )
}

fn handle_programs_set_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(active) = req.params.get("active").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing active", None);
    };

    if let Err(e) = db::set_program_active(conn, &name, active) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "name": name, "active": active }))
}

fn handle_programs_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match workspace_store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let csv = match required_str(req, "csv") {
        Ok(v) => v,
        Err(e) => return e,
    };

    // Names must round-trip through the file naming scheme.
    if programs::display_name(&programs::file_stem(&name)).as_deref() != Some(name.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "program name must look like \"2025: Term 1\"",
            None,
        );
    }

    // A table that does not parse is never stored.
    if let Err(e) = schedule::parse_schedule(csv.as_bytes()) {
        return err_engine(&req.id, &e);
    }

    if let Err(e) = store.write(&name, csv.as_bytes()) {
        return err(&req.id, "io_failed", e.to_string(), None);
    }
    {
        let conn = match db_conn(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        if let Err(e) = db::register_program(conn, &name) {
            return err(&req.id, "db_insert_failed", e.to_string(), None);
        }
    }
    state.schedule_cache.invalidate(&name);

    ok(&req.id, json!({ "name": name }))
}

fn handle_programs_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match workspace_store(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let had_file = store.exists(&name);
    if had_file {
        if let Err(e) = store.remove(&name) {
            return err(&req.id, "io_failed", e.to_string(), None);
        }
    }
    let had_entry = {
        let conn = match db_conn(state, req) {
            Ok(v) => v,
            Err(e) => return e,
        };
        match db::remove_program_entry(conn, &name) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
        }
    };
    if !had_file && !had_entry {
        return err(&req.id, "not_found", "training program not found", None);
    }
    state.schedule_cache.invalidate(&name);

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "programs.list" => Some(handle_programs_list(state, req)),
        "programs.setActive" => Some(handle_programs_set_active(state, req)),
        "programs.save" => Some(handle_programs_save(state, req)),
        "programs.delete" => Some(handle_programs_delete(state, req)),
        _ => None,
    }
}
