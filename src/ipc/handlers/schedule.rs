use crate::db;
use crate::ipc::error::{err, err_engine, ok};
use crate::ipc::types::{AppState, Request};
use crate::programs::ProgramStore;
use crate::schedule::{
    self, ProgramStatus, ScheduleTable, ViewSelection, DATE_FORMAT,
};
use chrono::{Local, NaiveDate};
use serde_json::{json, Value as JsonValue};
use std::time::SystemTime;

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

/// `today` is an explicit parameter so report output is reproducible; it
/// defaults to the current local date.
fn parse_today(req: &Request) -> Result<NaiveDate, serde_json::Value> {
    match req.params.get("today").and_then(|v| v.as_str()) {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
            err(
                &req.id,
                "bad_params",
                "today must be a DD/MM/YYYY date",
                None,
            )
        }),
        None => Ok(Local::now().date_naive()),
    }
}

fn selection_from(req: &Request) -> Result<ViewSelection, serde_json::Value> {
    let field = |key: &'static str| -> Result<Vec<String>, serde_json::Value> {
        parse_string_array(req.params.get(key))
            .map_err(|e| err(&req.id, "bad_params", format!("{key} {e}"), None))
    };
    Ok(ViewSelection {
        years: field("years")?,
        periods: field("periods")?,
        weeks: field("weeks")?,
        users: field("users")?,
    })
}

/// Resolve the requested (or default active) program and parse its table,
/// going through the fingerprint cache.
fn load_table(
    state: &mut AppState,
    req: &Request,
) -> Result<(String, ScheduleTable), serde_json::Value> {
    let store = workspace_store(state, req)?;
    let requested = req
        .params
        .get("program")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let name = {
        let conn = state
            .db
            .as_ref()
            .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))?;
        let registry = db::program_registry(conn)
            .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
        let files = store
            .list()
            .map_err(|e| err(&req.id, "io_failed", e.to_string(), None))?;
        let candidates: Vec<ProgramStatus> = registry
            .into_iter()
            .filter(|p| files.contains(&p.name))
            .collect();
        schedule::select_active_program(&candidates, requested.as_deref())
            .map_err(|e| err_engine(&req.id, &e))?
    };

    let bytes = store
        .read(&name)
        .map_err(|e| err(&req.id, "io_failed", e.to_string(), None))?;
    let table = state
        .schedule_cache
        .get_or_parse(&name, &bytes, SystemTime::now())
        .map_err(|e| err_engine(&req.id, &e))?;
    Ok((name, table))
}

fn handle_schedule_view(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = match parse_today(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let selection = match selection_from(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (name, table) = match load_table(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let view = match schedule::filter_view(&table, &selection) {
        Ok(v) => v,
        Err(e) => return err_engine(&req.id, &e),
    };
    let next_week = table.next_week(today).map(|(_, w)| w.label.clone());

    ok(
        &req.id,
        json!({ "program": name, "nextWeek": next_week, "view": view }),
    )
}

fn handle_schedule_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = match parse_today(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (name, table) = match load_table(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let next_week = table.next_week(today).map(|(_, w)| w.label.clone());

    ok(
        &req.id,
        json!({
            "program": name,
            "years": table.year_groups(),
            "periods": table.periods(),
            "weeks": table.week_labels(),
            "nextWeek": next_week,
        }),
    )
}

fn handle_schedule_weekly_report(state: &mut AppState, req: &Request) -> serde_json::Value {
    let today = match parse_today(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (name, table) = match load_table(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let report = match schedule::weekly_report(&table, today) {
        Ok(v) => v,
        Err(e) => return err_engine(&req.id, &e),
    };

    ok(
        &req.id,
        json!({
            "program": name,
            "weekLabel": report.week_label,
            "date": report.date,
            "lines": report.lines,
            "plainText": report.render_plain(),
            "styledText": report.render_styled(),
        }),
    )
}

fn handle_schedule_upcoming(state: &mut AppState, req: &Request) -> serde_json::Value {
    let user = match required_str(req, "user") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let today = match parse_today(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (name, table) = match load_table(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let upcoming = schedule::upcoming_for_user(&table, &user, today);
    let dates: Vec<serde_json::Value> = upcoming
        .iter()
        .map(|(date, entries)| {
            json!({
                "date": date.format(DATE_FORMAT).to_string(),
                "entries": entries,
            })
        })
        .collect();

    ok(
        &req.id,
        json!({ "program": name, "user": user, "dates": dates }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.view" => Some(handle_schedule_view(state, req)),
        "schedule.options" => Some(handle_schedule_options(state, req)),
        "schedule.weeklyReport" => Some(handle_schedule_weekly_report(state, req)),
        "schedule.upcoming" => Some(handle_schedule_upcoming(state, req)),
        _ => None,
    }
}
