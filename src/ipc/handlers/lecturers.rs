use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::lecturers::ensure_for_track;
use crate::store::SqliteStore;
use serde_json::{json, Value};

fn handle_ensure_for_track(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let track_id = match required_str(req, "trackId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut store = SqliteStore::new(conn);
    match ensure_for_track(&mut store, &state.tracks, track_id, &state.config.email_domain) {
        Ok(Some((lecturer, created))) => {
            ok(&req.id, json!({ "lecturer": lecturer, "created": created }))
        }
        Ok(None) => ok(&req.id, json!({ "lecturer": null, "created": false })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "lecturers.ensureForTrack" => Some(handle_ensure_for_track(state, req)),
        _ => None,
    }
}
