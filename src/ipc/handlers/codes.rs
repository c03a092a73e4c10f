use crate::codes::{generate_code, AdminCodeSequencer, CodeRequest};
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::models::{Collection, FileType};
use crate::store::{EntityStore, SqliteStore, StoreError};
use serde_json::{json, Value};

const MAX_ADMIN_BATCH: u64 = 500;

/// Codes already taken: `existingCodes` when the caller sends it, otherwise
/// the matching field across the open workspace's collection.
fn existing_codes(state: &AppState, req: &Request, kind: &str) -> Result<Vec<String>, StoreError> {
    if let Some(list) = req.params.get("existingCodes").and_then(|v| v.as_array()) {
        return Ok(list
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect());
    }
    let Some(conn) = state.db.as_ref() else {
        return Ok(Vec::new());
    };
    let (collection, field) = match kind {
        "file" => (Collection::Files, "file_code"),
        "course" => (Collection::Courses, "course_code"),
        _ => (Collection::Users, "admin_id"),
    };
    let records = SqliteStore::new(conn).list(collection)?;
    Ok(records
        .iter()
        .filter(|r| collection != Collection::Users || r.get("role") == Some(&json!("admin")))
        .filter_map(|r| r.get(field).and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect())
}

fn handle_generate(state: &mut AppState, req: &Request) -> Value {
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if !matches!(kind, "file" | "course" | "admin") {
        return err(
            &req.id,
            "bad_params",
            format!("unknown code kind: {kind}"),
            Some(json!({ "kind": kind })),
        );
    }
    let existing = match existing_codes(state, req, kind) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let existing = existing.iter().map(String::as_str);

    match kind {
        "file" => {
            let request = CodeRequest::File {
                course_code: optional_str(req, "courseCode"),
                file_type: FileType::classify(optional_str(req, "fileType")),
            };
            ok(&req.id, json!({ "code": generate_code(request, existing) }))
        }
        "course" => {
            let track_id = match required_str(req, "trackId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let code = generate_code(CodeRequest::Course { track_id }, existing);
            ok(&req.id, json!({ "code": code }))
        }
        _ => {
            let count = req
                .params
                .get("count")
                .and_then(|v| v.as_u64())
                .unwrap_or(1)
                .clamp(1, MAX_ADMIN_BATCH);
            let mut sequencer = AdminCodeSequencer::from_existing(existing);
            let codes: Vec<String> = (0..count).map(|_| sequencer.next_code()).collect();
            ok(&req.id, json!({ "code": codes[0], "codes": codes }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "codes.generate" => Some(handle_generate(state, req)),
        _ => None,
    }
}
