use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{collection_param, db_conn, required_object, required_str};
use crate::ipc::types::{AppState, Request};
use crate::models::Record;
use crate::store::{EntityStore, SqliteStore};
use serde_json::{json, Value};

fn records_json(records: Vec<Record>) -> Value {
    Value::Array(records.into_iter().map(Value::Object).collect())
}

fn handle_list(state: &mut AppState, req: &Request) -> Value {
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    // First launch: nothing selected yet, nothing stored.
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "records": [], "version": 0 }));
    };
    match SqliteStore::new(conn).load(kind) {
        Ok(snap) => ok(
            &req.id,
            json!({ "records": records_json(snap.records), "version": snap.version }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_filter(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let predicate = match required_object(req, "where") {
        Ok(p) => p,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).filter(kind, &predicate) {
        Ok(records) => ok(&req.id, json!({ "records": records_json(records) })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).get(kind, id) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let record = match required_object(req, "record") {
        Ok(r) => r,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).create(kind, record) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match required_object(req, "patch") {
        Ok(p) => p,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).update(kind, id, &patch) {
        Ok(record) => ok(&req.id, json!({ "record": record })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let id = match required_str(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match SqliteStore::new(conn).delete(kind, id) {
        Ok(()) => ok(&req.id, json!({ "deleted": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_set_all(state: &mut AppState, req: &Request) -> Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match collection_param(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let Some(items) = req.params.get("records").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "params.records must be an array", None);
    };
    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(obj) = item.as_object() else {
            return err(
                &req.id,
                "bad_params",
                format!("params.records[{i}] must be an object"),
                None,
            );
        };
        records.push(obj.clone());
    }
    let expected = req.params.get("expectedVersion").and_then(|v| v.as_i64());

    match SqliteStore::new(conn).write(kind, &records, expected) {
        Ok(version) => ok(
            &req.id,
            json!({ "version": version, "count": records.len() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "entities.list" => Some(handle_list(state, req)),
        "entities.filter" => Some(handle_filter(state, req)),
        "entities.get" => Some(handle_get(state, req)),
        "entities.create" => Some(handle_create(state, req)),
        "entities.update" => Some(handle_update(state, req)),
        "entities.delete" => Some(handle_delete(state, req)),
        "entities.setAll" => Some(handle_set_all(state, req)),
        _ => None,
    }
}
