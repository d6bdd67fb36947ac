mod test_support;

use serde_json::json;
use test_support::{
    request_err, request_ok, setup_workspace_with_program, spawn_sidecar, temp_dir,
};

#[test]
fn upcoming_buckets_ascending_and_skips_empty_dates() {
    let workspace = temp_dir("cadet-upcoming");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.upcoming",
        json!({ "user": "SgtX", "today": "01/01/2090" }),
    );
    assert_eq!(result.get("user").and_then(|v| v.as_str()), Some("SgtX"));

    let dates = result.get("dates").and_then(|v| v.as_array()).expect("dates");
    // SgtX instructs in Week 1 and Week 3; Week 2 is omitted entirely.
    assert_eq!(dates.len(), 2);
    assert_eq!(
        dates[0].get("date").and_then(|v| v.as_str()),
        Some("05/02/2090")
    );
    assert_eq!(
        dates[1].get("date").and_then(|v| v.as_str()),
        Some("19/02/2090")
    );

    let first = dates[0].get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].get("yearGroup").and_then(|v| v.as_str()), Some("Year One"));
    assert_eq!(first[0].get("periodIndex").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(first[0].get("activity").and_then(|v| v.as_str()), Some("PT"));
    assert_eq!(first[0].get("location").and_then(|v| v.as_str()), Some("Gym"));
    assert_eq!(first[1].get("yearGroup").and_then(|v| v.as_str()), Some("Year Two"));

    let last = dates[1].get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].get("activity").and_then(|v| v.as_str()), Some("Nav"));
    assert_eq!(last[0].get("periodIndex").and_then(|v| v.as_u64()), Some(0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn upcoming_honors_today_cutoff_and_exact_name_match() {
    let workspace = temp_dir("cadet-upcoming-cutoff");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    setup_workspace_with_program(&mut stdin, &mut reader, &workspace);

    // Past Week 1, only the Week 3 assignment remains.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "schedule.upcoming",
        json!({ "user": "SgtX", "today": "06/02/2090" }),
    );
    let dates = result.get("dates").and_then(|v| v.as_array()).expect("dates");
    assert_eq!(dates.len(), 1);
    assert_eq!(
        dates[0].get("date").and_then(|v| v.as_str()),
        Some("19/02/2090")
    );

    // Name matching is exact and case-sensitive.
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.upcoming",
        json!({ "user": "sgtx", "today": "01/01/2090" }),
    );
    let dates = result.get("dates").and_then(|v| v.as_array()).expect("dates");
    assert!(dates.is_empty());

    let code = request_err(&mut stdin, &mut reader, "3", "schedule.upcoming", json!({}));
    assert_eq!(code, "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
