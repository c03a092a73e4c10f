use crate::backup;
use crate::ipc::error::{err, maintenance_err, ok, store_err};
use crate::ipc::helpers::{collection_param, db_conn, optional_str, require_confirm};
use crate::ipc::types::{AppState, Request};
use crate::maintenance;
use crate::seed::SampleDataset;
use crate::store::SqliteStore;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_deduplicate(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match maintenance::deduplicate(&mut SqliteStore::new(conn), kind) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => maintenance_err(&req.id, &e),
    }
}

fn handle_remove_invalid(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    match maintenance::remove_invalid(
        &mut SqliteStore::new(conn),
        &state.tracks,
        &state.config.email_domain,
        kind,
    ) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => maintenance_err(&req.id, &e),
    }
}

fn handle_clear(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    if let Err(e) = require_confirm(req) {
        return e;
    }
    match maintenance::clear_entity(&mut SqliteStore::new(conn), kind) {
        Ok(report) => ok(&req.id, json!(report)),
        Err(e) => maintenance_err(&req.id, &e),
    }
}

fn handle_refresh_all(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = require_confirm(req) {
        return e;
    }
    let mut seed = SampleDataset {
        email_domain: state.config.email_domain.clone(),
    };
    match maintenance::refresh_all(&mut SqliteStore::new(conn), &state.tracks, &mut seed) {
        Ok(counts) => ok(&req.id, json!({ "seeded": counts })),
        Err(e) => maintenance_err(&req.id, &e),
    }
}

fn handle_export(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let store = SqliteStore::new(conn);

    let Some(out_path) = optional_str(req, "outPath").map(PathBuf::from) else {
        return match maintenance::export_all(&store) {
            Ok(dump) => ok(&req.id, dump),
            Err(e) => store_err(&req.id, &e),
        };
    };
    match backup::export_snapshot_bundle(&store, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "recordCount": summary.record_count,
            }),
        ),
        Err(e) => err(&req.id, "io_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "maintenance.deduplicate" => Some(handle_deduplicate(state, req)),
        "maintenance.removeInvalid" => Some(handle_remove_invalid(state, req)),
        "maintenance.clear" => Some(handle_clear(state, req)),
        "maintenance.refreshAll" => Some(handle_refresh_all(state, req)),
        "maintenance.export" => Some(handle_export(state, req)),
        _ => None,
    }
}
