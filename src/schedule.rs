use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rows per (year group, period) slot in the raw table:
/// activity / location / instructor.
pub const BLOCK_ROWS: usize = 3;

pub const DATE_FORMAT: &str = "%d/%m/%Y";

pub const NO_PERIODS_MARKER: &str = "No Periods Specified";
const NOT_SPECIFIED: &str = "Not Specified";

const YEAR_GROUP_COLUMN: &str = "Year Group";
const PERIOD_COLUMN: &str = "Period";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("malformed schedule: {0}")]
    Malformed(String),
    #[error("every scheduled week is in the past")]
    NoUpcomingWeek,
    #[error("unknown {field} selection: {value}")]
    UnknownSelection { field: &'static str, value: String },
    #[error("no active training programs")]
    NoActivePrograms,
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::Malformed(_) => "malformed_schedule",
            ScheduleError::NoUpcomingWeek => "no_upcoming_week",
            ScheduleError::UnknownSelection { .. } => "unknown_selection",
            ScheduleError::NoActivePrograms => "no_active_programs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekColumn {
    pub label: String,
    pub date: NaiveDate,
}

impl WeekColumn {
    /// Header label without the `.N` suffix that spreadsheet exports append
    /// to de-duplicate repeated column names.
    pub fn display_label(&self) -> &str {
        if let Some((head, tail)) = self.label.rsplit_once('.') {
            if !head.is_empty() && !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
                return head;
            }
        }
        &self.label
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCell {
    pub activity: String,
    pub location: String,
    pub instructor: String,
}

impl PeriodCell {
    fn is_blank(&self) -> bool {
        self.activity.is_empty() && self.location.is_empty() && self.instructor.is_empty()
    }
}

/// One (year group, period) slot, with one cell per week column.
/// `year_group` is always dense here: the sparse source column is
/// forward-filled during parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodBlock {
    pub year_group: String,
    pub period: String,
    pub cells: Vec<PeriodCell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTable {
    pub weeks: Vec<WeekColumn>,
    /// Per-week dress/uniform values when the table carries a dress row.
    pub dress: Option<Vec<String>>,
    pub blocks: Vec<PeriodBlock>,
}

impl ScheduleTable {
    /// Earliest week dated today or later; ties resolve to the leftmost
    /// column. `None` means the whole schedule is in the past.
    pub fn next_week(&self, today: NaiveDate) -> Option<(usize, &WeekColumn)> {
        let mut best: Option<(usize, &WeekColumn)> = None;
        for (idx, week) in self.weeks.iter().enumerate() {
            if week.date < today {
                continue;
            }
            match best {
                Some((_, b)) if b.date <= week.date => {}
                _ => best = Some((idx, week)),
            }
        }
        best
    }

    pub fn year_groups(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for block in &self.blocks {
            if !block.year_group.is_empty() && !out.contains(&block.year_group) {
                out.push(block.year_group.clone());
            }
        }
        out
    }

    pub fn periods(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for block in &self.blocks {
            if !block.period.is_empty() && !out.contains(&block.period) {
                out.push(block.period.clone());
            }
        }
        out
    }

    pub fn week_labels(&self) -> Vec<String> {
        self.weeks.iter().map(|w| w.label.clone()).collect()
    }
}

/// Spreadsheet exports stamp empty cells with the `nan` sentinel; it must
/// never reach rendered text.
fn normalize_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        return String::new();
    }
    trimmed.to_string()
}

pub fn parse_schedule(bytes: &[u8]) -> Result<ScheduleTable, ScheduleError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ScheduleError::Malformed(format!("unreadable header row: {e}")))?
        .clone();

    let mut year_col = None;
    let mut period_col = None;
    let mut week_cols: Vec<(usize, String)> = Vec::new();
    for (idx, name) in headers.iter().enumerate() {
        let name = name.trim();
        if name == YEAR_GROUP_COLUMN && year_col.is_none() {
            year_col = Some(idx);
        } else if name == PERIOD_COLUMN && period_col.is_none() {
            period_col = Some(idx);
        } else if !name.is_empty() {
            week_cols.push((idx, name.to_string()));
        }
    }
    let year_col = year_col
        .ok_or_else(|| ScheduleError::Malformed(format!("missing {YEAR_GROUP_COLUMN} column")))?;
    let period_col = period_col
        .ok_or_else(|| ScheduleError::Malformed(format!("missing {PERIOD_COLUMN} column")))?;
    if week_cols.is_empty() {
        return Err(ScheduleError::Malformed("no week columns".to_string()));
    }

    let mut rows: Vec<csv::StringRecord> = Vec::new();
    for record in reader.records() {
        rows.push(record.map_err(|e| ScheduleError::Malformed(format!("unreadable row: {e}")))?);
    }
    if rows.is_empty() {
        return Err(ScheduleError::Malformed("missing date row".to_string()));
    }

    let cell = |record: &csv::StringRecord, idx: usize| normalize_cell(record.get(idx).unwrap_or(""));

    let date_row = &rows[0];
    let mut weeks = Vec::with_capacity(week_cols.len());
    for (idx, label) in &week_cols {
        let raw = cell(date_row, *idx);
        let date = NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| {
            ScheduleError::Malformed(format!("week column {label} has unparseable date {raw:?}"))
        })?;
        weeks.push(WeekColumn {
            label: label.clone(),
            date,
        });
    }

    // The dress row is optional. It is present exactly when the row after the
    // date row carries neither a year group nor a period label.
    let mut body_start = 1;
    let mut dress: Option<Vec<String>> = None;
    if let Some(row) = rows.get(1) {
        if cell(row, year_col).is_empty() && cell(row, period_col).is_empty() {
            dress = Some(week_cols.iter().map(|(idx, _)| cell(row, *idx)).collect());
            body_start = 2;
        }
    }

    let body = &rows[body_start..];
    if body.len() % BLOCK_ROWS != 0 {
        return Err(ScheduleError::Malformed(format!(
            "{} schedule rows do not divide into {BLOCK_ROWS}-row period blocks",
            body.len()
        )));
    }

    // Forward-fill the sparse Year Group column in one left-to-right scan so
    // every block carries a dense label before any regrouping happens.
    let mut dense_years = Vec::with_capacity(body.len());
    let mut last_year = String::new();
    for row in body {
        let value = cell(row, year_col);
        if !value.is_empty() {
            last_year = value;
        }
        dense_years.push(last_year.clone());
    }

    let mut blocks = Vec::with_capacity(body.len() / BLOCK_ROWS);
    for (block_idx, chunk) in body.chunks(BLOCK_ROWS).enumerate() {
        let cells = week_cols
            .iter()
            .map(|(idx, _)| PeriodCell {
                activity: cell(&chunk[0], *idx),
                location: cell(&chunk[1], *idx),
                instructor: cell(&chunk[2], *idx),
            })
            .collect();
        blocks.push(PeriodBlock {
            year_group: dense_years[block_idx * BLOCK_ROWS].clone(),
            period: cell(&chunk[0], period_col),
            cells,
        });
    }

    Ok(ScheduleTable {
        weeks,
        dress,
        blocks,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ViewSelection {
    pub years: Vec<String>,
    pub periods: Vec<String>,
    pub weeks: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCell {
    pub text: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRow {
    pub year_group: String,
    pub period: String,
    pub cells: Vec<RenderCell>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTable {
    pub columns: Vec<String>,
    pub rows: Vec<RenderRow>,
}

fn check_selection(
    field: &'static str,
    selected: &[String],
    available: &[String],
) -> Result<(), ScheduleError> {
    for value in selected {
        if !available.contains(value) {
            return Err(ScheduleError::UnknownSelection {
                field,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

fn merged_cell_text(cell: &PeriodCell) -> String {
    if cell.is_blank() {
        return NO_PERIODS_MARKER.to_string();
    }
    format!("{} {}", cell.activity, cell.location)
        .trim()
        .to_string()
}

/// Expand/filter the table into a grid with one row per period block.
///
/// Year/period selections keep whole blocks; a block's rows never split.
/// Week selections project columns in source order. User selections never
/// remove rows, they only set the per-cell highlight flag.
pub fn filter_view(
    table: &ScheduleTable,
    selection: &ViewSelection,
) -> Result<RenderTable, ScheduleError> {
    check_selection("year group", &selection.years, &table.year_groups())?;
    check_selection("period", &selection.periods, &table.periods())?;
    check_selection("week", &selection.weeks, &table.week_labels())?;

    let week_keep: Vec<usize> = if selection.weeks.is_empty() {
        (0..table.weeks.len()).collect()
    } else {
        table
            .weeks
            .iter()
            .enumerate()
            .filter(|(_, w)| selection.weeks.contains(&w.label))
            .map(|(idx, _)| idx)
            .collect()
    };

    let mut columns = vec![YEAR_GROUP_COLUMN.to_string(), PERIOD_COLUMN.to_string()];
    columns.extend(week_keep.iter().map(|&idx| table.weeks[idx].label.clone()));

    let mut rows = Vec::new();
    let mut last_year = String::new();
    for block in &table.blocks {
        if !selection.years.is_empty() && !selection.years.contains(&block.year_group) {
            continue;
        }
        if !selection.periods.is_empty() && !selection.periods.contains(&block.period) {
            continue;
        }
        let cells = week_keep
            .iter()
            .map(|&idx| {
                let cell = &block.cells[idx];
                RenderCell {
                    text: merged_cell_text(cell),
                    highlighted: !cell.instructor.is_empty()
                        && selection.users.contains(&cell.instructor),
                }
            })
            .collect();
        // Show the year group label once per run of blocks.
        let year_group = if block.year_group == last_year {
            String::new()
        } else {
            last_year = block.year_group.clone();
            block.year_group.clone()
        };
        rows.push(RenderRow {
            year_group,
            period: block.period.clone(),
            cells,
        });
    }

    Ok(RenderTable { columns, rows })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Heading,
    Subheading,
    Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub level: LineLevel,
    pub text: String,
}

/// The weekly report is built once as tagged lines; the plain and styled
/// outputs are projections of the same sequence and cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub week_label: String,
    pub date: String,
    pub lines: Vec<ReportLine>,
}

impl WeeklyReport {
    pub fn render_plain(&self) -> String {
        let mut out = String::from("Weekly Report\n");
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    pub fn render_styled(&self) -> String {
        let mut out = String::from("# Weekly Report\n");
        for line in &self.lines {
            match line.level {
                LineLevel::Heading => out.push_str("## "),
                LineLevel::Subheading => out.push_str("### "),
                LineLevel::Body => {}
            }
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }
}

fn or_not_specified(value: &str) -> &str {
    if value.is_empty() {
        NOT_SPECIFIED
    } else {
        value
    }
}

pub fn weekly_report(
    table: &ScheduleTable,
    today: NaiveDate,
) -> Result<WeeklyReport, ScheduleError> {
    let (week_idx, week) = table.next_week(today).ok_or(ScheduleError::NoUpcomingWeek)?;
    let date = week.date.format(DATE_FORMAT).to_string();

    let mut lines = vec![ReportLine {
        level: LineLevel::Heading,
        text: format!("{} - {}", week.display_label(), date),
    }];
    let dress = table
        .dress
        .as_ref()
        .and_then(|d| d.get(week_idx))
        .filter(|v| !v.is_empty());
    lines.push(ReportLine {
        level: LineLevel::Heading,
        text: match dress {
            Some(value) => format!("Dress: {value}"),
            None => format!("Dress: {NOT_SPECIFIED}"),
        },
    });

    for year in table.year_groups() {
        lines.push(ReportLine {
            level: LineLevel::Subheading,
            text: year.clone(),
        });
        for (position, block) in table
            .blocks
            .iter()
            .filter(|b| b.year_group == year)
            .enumerate()
        {
            let cell = &block.cells[week_idx];
            if cell.is_blank() {
                // Consecutive empty periods collapse into one marker line.
                if lines.last().map(|l| l.text.as_str()) != Some(NO_PERIODS_MARKER) {
                    lines.push(ReportLine {
                        level: LineLevel::Body,
                        text: NO_PERIODS_MARKER.to_string(),
                    });
                }
            } else {
                lines.push(ReportLine {
                    level: LineLevel::Body,
                    text: format!(
                        "Period {}: {} - {} with {}",
                        position + 1,
                        or_not_specified(&cell.activity),
                        or_not_specified(&cell.location),
                        or_not_specified(&cell.instructor)
                    ),
                });
            }
        }
    }

    Ok(WeeklyReport {
        week_label: week.display_label().to_string(),
        date,
        lines,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEntry {
    pub week_date: String,
    pub period_index: usize,
    pub activity: String,
    pub location: String,
    pub year_group: String,
}

/// Upcoming lesson assignments for one instructor, bucketed by week date in
/// ascending calendar order. Dates with no matches are omitted. Matching is
/// an exact, case-sensitive comparison against the stored display name.
pub fn upcoming_for_user(
    table: &ScheduleTable,
    user_name: &str,
    today: NaiveDate,
) -> BTreeMap<NaiveDate, Vec<UpcomingEntry>> {
    let mut out: BTreeMap<NaiveDate, Vec<UpcomingEntry>> = BTreeMap::new();
    for (week_idx, week) in table.weeks.iter().enumerate() {
        if week.date < today {
            continue;
        }
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for block in &table.blocks {
            let position = positions.entry(block.year_group.as_str()).or_insert(0);
            let period_index = *position;
            *position += 1;

            let cell = &block.cells[week_idx];
            if cell.instructor.is_empty() || cell.instructor != user_name {
                continue;
            }
            out.entry(week.date).or_default().push(UpcomingEntry {
                week_date: week.date.format(DATE_FORMAT).to_string(),
                period_index,
                activity: cell.activity.clone(),
                location: cell.location.clone(),
                year_group: block.year_group.clone(),
            });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramStatus {
    pub name: String,
    pub active: bool,
}

/// Resolve which training program to serve. Only active registry entries are
/// candidates; with no explicit request the lexicographically last candidate
/// wins (program names sort chronologically: `"2025: Term 1"`).
pub fn select_active_program(
    registry: &[ProgramStatus],
    requested: Option<&str>,
) -> Result<String, ScheduleError> {
    let mut candidates: Vec<&str> = registry
        .iter()
        .filter(|p| p.active)
        .map(|p| p.name.as_str())
        .collect();
    if candidates.is_empty() {
        return Err(ScheduleError::NoActivePrograms);
    }
    if let Some(name) = requested {
        if candidates.iter().any(|c| *c == name) {
            return Ok(name.to_string());
        }
        return Err(ScheduleError::UnknownSelection {
            field: "program",
            value: name.to_string(),
        });
    }
    candidates.sort_unstable();
    match candidates.pop() {
        Some(name) => Ok(name.to_string()),
        None => Err(ScheduleError::NoActivePrograms),
    }
}
