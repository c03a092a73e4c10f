mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar_with_env, temp_dir};

#[test]
fn lecturer_is_synthesized_once_per_track() {
    let workspace = temp_dir("coursehub-lecturers-ensure");
    let (_child, mut stdin, mut reader) = spawn_sidecar_with_env(&[
        ("COURSEHUB_WORKSPACE", workspace.to_str().expect("utf8 path")),
        ("COURSEHUB_EMAIL_DOMAIN", "@Campus.Example"),
    ]);

    let health = request_ok(&mut stdin, &mut reader, "0", "health", json!({}));
    assert!(health["workspacePath"].as_str().is_some());

    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "lecturers.ensureForTrack",
        json!({ "trackId": "unknown-track-id" }),
    );
    assert_eq!(unknown["lecturer"], json!(null));
    assert_eq!(unknown["created"], json!(false));
    let none = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "entities.list",
        json!({ "kind": "lecturers" }),
    );
    assert_eq!(none["records"], json!([]));
    assert_eq!(none["version"], json!(0));

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "lecturers.ensureForTrack",
        json!({ "trackId": "business-undergrad" }),
    );
    assert_eq!(first["created"], json!(true));
    let lecturer = &first["lecturer"];
    assert_eq!(lecturer["academic_track_ids"], json!(["business-undergrad"]));
    assert_eq!(lecturer["status"], json!("active"));
    assert!(lecturer["email"]
        .as_str()
        .expect("email")
        .ends_with("@campus.example"));

    let second = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lecturers.ensureForTrack",
        json!({ "trackId": "business-undergrad" }),
    );
    assert_eq!(second["created"], json!(false));
    assert_eq!(second["lecturer"]["id"], lecturer["id"]);

    let all = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "entities.list",
        json!({ "kind": "lecturers" }),
    );
    assert_eq!(all["records"].as_array().map(|a| a.len()), Some(1));

    let _ = std::fs::remove_dir_all(workspace);
}
