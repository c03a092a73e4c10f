use crate::ipc::error::{err, maintenance_err, ok, store_err};
use crate::ipc::helpers::{collection_param, db_conn, required_object};
use crate::ipc::types::{AppState, Request};
use crate::legacy;
use crate::maintenance;
use crate::normalize::{normalize_record, NormalizeContext};
use crate::store::SqliteStore;
use serde_json::{json, Value};

fn handle_normalize(state: &mut AppState, req: &Request) -> Value {
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let record = match required_object(req, "record") {
        Ok(r) => r,
        Err(e) => return e,
    };

    let ctx = match state.db.as_ref() {
        Some(conn) => NormalizeContext::from_store(&SqliteStore::new(conn)),
        None => Ok(NormalizeContext::empty()),
    };
    let mut ctx = match ctx {
        Ok(c) => c,
        Err(e) => return store_err(&req.id, &e),
    };

    match normalize_record(kind, legacy::canonicalize(kind, record), &mut ctx) {
        Ok(n) => ok(
            &req.id,
            json!({
                "changed": n.changed(),
                "repairs": n.repairs,
                "record": n.record,
            }),
        ),
        Err(e) => err(&req.id, "bad_record", e.to_string(), None),
    }
}

fn handle_reconcile_preview(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn);
    match maintenance::reconcile_preview(
        &store,
        &state.tracks,
        &state.config.email_domain,
        kind,
    ) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => maintenance_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "records.normalize" => Some(handle_normalize(state, req)),
        "records.reconcilePreview" => Some(handle_reconcile_preview(state, req)),
        _ => None,
    }
}
