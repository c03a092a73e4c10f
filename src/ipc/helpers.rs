use rusqlite::Connection;
use serde_json::Value;

use crate::ipc::error::{err, store_err};
use crate::ipc::types::{AppState, Request};
use crate::models::{Collection, Record};
use crate::store::StoreError;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str<'r>(req: &'r Request, key: &str) -> Result<&'r str, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing params.{key}"), None))
}

pub fn optional_str<'r>(req: &'r Request, key: &str) -> Option<&'r str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn required_object(req: &Request, key: &str) -> Result<Record, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_object())
        .cloned()
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("params.{key} must be an object"),
                None,
            )
        })
}

pub fn collection_param(req: &Request) -> Result<Collection, Value> {
    let raw = required_str(req, "kind")?;
    Collection::parse(raw)
        .ok_or_else(|| store_err(&req.id, &StoreError::UnknownCollection(raw.to_string())))
}

/// Destructive maintenance runs only with `confirm: true`.
pub fn require_confirm(req: &Request) -> Result<(), Value> {
    if req.params.get("confirm").and_then(|v| v.as_bool()) == Some(true) {
        return Ok(());
    }
    Err(err(
        &req.id,
        "confirmation_required",
        format!("{} needs params.confirm = true", req.method),
        None,
    ))
}
