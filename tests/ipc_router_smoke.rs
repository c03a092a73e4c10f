mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{error_code, request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("coursehub-router-smoke");
    let bundle_out = workspace.join("smoke-export.zip");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["workspacePath"], json!(null));
    assert_eq!(health["trackCount"], json!(12));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let calls = [
        ("tracks.list", json!({})),
        ("entities.list", json!({ "kind": "courses" })),
        ("entities.filter", json!({ "kind": "courses", "where": {} })),
        ("entities.get", json!({ "kind": "courses", "id": "missing" })),
        ("entities.create", json!({ "kind": "students", "record": { "full_name": "Adi Barak" } })),
        ("entities.update", json!({ "kind": "students", "id": "missing", "patch": {} })),
        ("entities.delete", json!({ "kind": "students", "id": "missing" })),
        ("entities.setAll", json!({ "kind": "messages", "records": [] })),
        ("codes.generate", json!({ "kind": "admin" })),
        ("records.normalize", json!({ "kind": "files", "record": {} })),
        ("records.reconcilePreview", json!({ "kind": "files" })),
        ("lecturers.ensureForTrack", json!({ "trackId": "unknown-track-id" })),
        ("maintenance.deduplicate", json!({ "kind": "students" })),
        ("maintenance.removeInvalid", json!({ "kind": "files" })),
        ("maintenance.clear", json!({ "kind": "messages", "confirm": true })),
        ("maintenance.refreshAll", json!({})),
        ("maintenance.export", json!({ "outPath": bundle_out.to_string_lossy() })),
    ];
    for (i, (method, params)) in calls.into_iter().enumerate() {
        let resp = request(&mut stdin, &mut reader, &format!("c{i}"), method, params);
        assert_ne!(
            error_code(&resp),
            Some("not_implemented"),
            "unexpected unknown method for {}",
            method
        );
    }

    let unknown = request(&mut stdin, &mut reader, "99", "grades.compute", json!({}));
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn malformed_line_gets_bad_json_and_the_loop_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read bad_json response");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("response json");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let health = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
    assert!(health.get("version").is_some());
}
