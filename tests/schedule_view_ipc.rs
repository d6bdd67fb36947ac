mod test_support;

use serde_json::json;
use test_support::{
    request_err, request_ok, setup_workspace_with_program, spawn_sidecar, temp_dir, SAMPLE_PROGRAM,
};

#[test]
fn full_view_merges_blocks_and_marks_next_week() {
    let workspace = temp_dir("cadet-view-full");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.view",
        json!({ "today": "10/02/2090" }),
    );
    assert_eq!(
        result.get("program").and_then(|v| v.as_str()),
        Some(SAMPLE_PROGRAM)
    );
    assert_eq!(result.get("nextWeek").and_then(|v| v.as_str()), Some("Week 2"));

    let view = result.get("view").expect("view");
    let columns: Vec<&str> = view
        .get("columns")
        .and_then(|v| v.as_array())
        .expect("columns")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(
        columns,
        vec!["Year Group", "Period", "Week 1", "Week 2", "Week 3"]
    );

    let rows = view.get("rows").and_then(|v| v.as_array()).expect("rows");
    // One merged row per 3-row block.
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0]
            .get("cells")
            .and_then(|v| v.as_array())
            .and_then(|c| c[0].get("text"))
            .and_then(|v| v.as_str()),
        Some("PT Gym")
    );
    // Year group label renders once per run.
    assert_eq!(rows[0].get("yearGroup").and_then(|v| v.as_str()), Some("Year One"));
    assert_eq!(rows[1].get("yearGroup").and_then(|v| v.as_str()), Some(""));
    assert_eq!(rows[2].get("yearGroup").and_then(|v| v.as_str()), Some("Year Two"));
    // An all-blank block cell renders the explicit marker once.
    assert_eq!(
        rows[1]
            .get("cells")
            .and_then(|v| v.as_array())
            .and_then(|c| c[1].get("text"))
            .and_then(|v| v.as_str()),
        Some("No Periods Specified")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn year_and_week_filters_project_whole_blocks_and_columns() {
    let workspace = temp_dir("cadet-view-filter");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.view",
        json!({
            "today": "01/01/2090",
            "years": ["Year One"],
            "weeks": ["Week 2"]
        }),
    );
    let view = result.get("view").expect("view");
    let columns: Vec<&str> = view
        .get("columns")
        .and_then(|v| v.as_array())
        .expect("columns")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(columns, vec!["Year Group", "Period", "Week 2"]);

    let rows = view.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.get("cells").and_then(|v| v.as_array()).map(|c| c.len()), Some(1));
    }

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn user_selection_highlights_cells_without_dropping_rows() {
    let workspace = temp_dir("cadet-view-highlight");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.view",
        json!({ "today": "01/01/2090", "users": ["SgtX"] }),
    );
    let rows = result
        .get("view")
        .and_then(|v| v.get("rows"))
        .and_then(|v| v.as_array())
        .expect("rows");
    assert_eq!(rows.len(), 3);

    let cell = |row: usize, col: usize| {
        rows[row]
            .get("cells")
            .and_then(|v| v.as_array())
            .and_then(|c| c[col].get("highlighted"))
            .and_then(|v| v.as_bool())
            .expect("highlight flag")
    };
    assert!(cell(0, 0));
    assert!(!cell(0, 1));
    assert!(cell(0, 2));
    assert!(cell(2, 0));
    assert!(!cell(2, 1));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn unknown_selection_and_missing_active_program_are_typed_errors() {
    let workspace = temp_dir("cadet-view-errors");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let code = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.view",
        json!({ "today": "01/01/2090", "weeks": ["Week 9"] }),
    );
    assert_eq!(code, "unknown_selection");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "programs.setActive",
        json!({ "name": SAMPLE_PROGRAM, "active": false }),
    );
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.view",
        json!({ "today": "01/01/2090" }),
    );
    assert_eq!(code, "no_active_programs");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn options_lists_distinct_groups_periods_and_weeks() {
    let workspace = temp_dir("cadet-view-options");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.options",
        json!({ "today": "01/01/2090" }),
    );
    assert_eq!(result.get("years"), Some(&json!(["Year One", "Year Two"])));
    assert_eq!(result.get("periods"), Some(&json!(["1", "2"])));
    assert_eq!(
        result.get("weeks"),
        Some(&json!(["Week 1", "Week 2", "Week 3"]))
    );
    assert_eq!(result.get("nextWeek").and_then(|v| v.as_str()), Some("Week 1"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
