use crate::legacy;
use crate::models::{Collection, Record};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} record not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} record already exists: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{kind} changed since it was read (expected version {expected}, found {actual})")]
    Conflict {
        kind: &'static str,
        expected: i64,
        actual: i64,
    },
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
    #[error("storage failure: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record encoding failure: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Stable error code reported over IPC.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateId { .. } => "duplicate_id",
            Self::Conflict { .. } => "conflict",
            Self::UnknownCollection(_) => "bad_params",
            Self::Sqlite(_) => "db_write_failed",
            Self::Json(_) => "bad_record",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::NotFound { kind, id } | Self::DuplicateId { kind, id } => {
                Some(json!({ "kind": kind, "id": id }))
            }
            Self::Conflict {
                kind,
                expected,
                actual,
            } => Some(json!({ "kind": kind, "expected": expected, "actual": actual })),
            _ => None,
        }
    }
}

/// A collection as read, with the version a conditional write must match.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<Record>,
    pub version: i64,
}

/// The record's id as text. Numeric ids from older exports match their
/// decimal form.
fn record_id(record: &Record) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// One collection's share of a `write_batch`.
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
    pub kind: Collection,
    pub records: Vec<Record>,
    pub expected_version: Option<i64>,
}

/// Named collections of JSON records.
///
/// Implementors only provide whole-collection `load` and `write`; every
/// per-record operation is a read-modify-write over the full array.
pub trait EntityStore {
    fn load(&self, kind: Collection) -> Result<Snapshot, StoreError>;

    /// Replaces the collection. With `expected_version` set, fails with
    /// `Conflict` and writes nothing when the stored version differs.
    /// Returns the new version.
    fn write(
        &mut self,
        kind: Collection,
        records: &[Record],
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError>;

    fn list(&self, kind: Collection) -> Result<Vec<Record>, StoreError> {
        Ok(self.load(kind)?.records)
    }

    fn set_all(&mut self, kind: Collection, records: &[Record]) -> Result<i64, StoreError> {
        self.write(kind, records, None)
    }

    /// Records whose fields equal every field of `predicate`.
    fn filter(&self, kind: Collection, predicate: &Record) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .list(kind)?
            .into_iter()
            .filter(|r| predicate.iter().all(|(k, v)| r.get(k) == Some(v)))
            .collect())
    }

    fn get(&self, kind: Collection, id: &str) -> Result<Record, StoreError> {
        self.list(kind)?
            .into_iter()
            .find(|r| record_id(r).as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.key(),
                id: id.to_string(),
            })
    }

    fn create(&mut self, kind: Collection, mut record: Record) -> Result<Record, StoreError> {
        let snap = self.load(kind)?;
        let id = match record_id(&record) {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                record.insert("id".into(), Value::String(id.clone()));
                id
            }
        };
        if snap.records.iter().any(|r| record_id(r).as_deref() == Some(id.as_str())) {
            return Err(StoreError::DuplicateId {
                kind: kind.key(),
                id,
            });
        }
        let mut records = snap.records;
        records.push(record.clone());
        self.write(kind, &records, Some(snap.version))?;
        Ok(record)
    }

    /// Shallow merge of `patch` into the record. The id is not patchable.
    fn update(&mut self, kind: Collection, id: &str, patch: &Record) -> Result<Record, StoreError> {
        let mut snap = self.load(kind)?;
        let Some(target) = snap.records.iter_mut().find(|r| record_id(r).as_deref() == Some(id)) else {
            return Err(StoreError::NotFound {
                kind: kind.key(),
                id: id.to_string(),
            });
        };
        for (k, v) in patch {
            if k == "id" {
                continue;
            }
            target.insert(k.clone(), v.clone());
        }
        let updated = target.clone();
        self.write(kind, &snap.records, Some(snap.version))?;
        Ok(updated)
    }

    fn delete(&mut self, kind: Collection, id: &str) -> Result<(), StoreError> {
        let snap = self.load(kind)?;
        let before = snap.records.len();
        let records: Vec<Record> = snap
            .records
            .into_iter()
            .filter(|r| record_id(r).as_deref() != Some(id))
            .collect();
        if records.len() == before {
            return Err(StoreError::NotFound {
                kind: kind.key(),
                id: id.to_string(),
            });
        }
        self.write(kind, &records, Some(snap.version))?;
        Ok(())
    }

    /// Conditional writes of several collections. Implementations that can
    /// should make this all-or-nothing: one stale version means nothing is
    /// written. Returns the new versions in batch order.
    fn write_batch(&mut self, batch: &[ConditionalWrite]) -> Result<Vec<i64>, StoreError> {
        batch
            .iter()
            .map(|w| self.write(w.kind, &w.records, w.expected_version))
            .collect()
    }

    /// Replaces several collections. Implementations that can should make
    /// this all-or-nothing.
    fn replace_collections(&mut self, batch: &[(Collection, Vec<Record>)]) -> Result<(), StoreError> {
        for (kind, records) in batch {
            self.set_all(*kind, records)?;
        }
        Ok(())
    }
}

pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn current_version(conn: &Connection, kind: Collection) -> Result<i64, StoreError> {
    let v: Option<i64> = conn
        .query_row(
            "SELECT version FROM collections WHERE kind = ?",
            [kind.key()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(v.unwrap_or(0))
}

fn upsert(
    conn: &Connection,
    kind: Collection,
    records: &[Record],
    version: i64,
) -> Result<(), StoreError> {
    let body = serde_json::to_string(records)?;
    conn.execute(
        "INSERT INTO collections(kind, records, version, updated_at) VALUES(?, ?, ?, ?)
         ON CONFLICT(kind) DO UPDATE SET
           records = excluded.records,
           version = excluded.version,
           updated_at = excluded.updated_at",
        (kind.key(), &body, version, now_stamp()),
    )?;
    Ok(())
}

fn checked_upsert(
    conn: &Connection,
    kind: Collection,
    records: &[Record],
    expected_version: Option<i64>,
) -> Result<i64, StoreError> {
    let actual = current_version(conn, kind)?;
    if let Some(expected) = expected_version {
        if expected != actual {
            return Err(StoreError::Conflict {
                kind: kind.key(),
                expected,
                actual,
            });
        }
    }
    let next = actual + 1;
    upsert(conn, kind, records, next)?;
    Ok(next)
}

impl EntityStore for SqliteStore<'_> {
    fn load(&self, kind: Collection) -> Result<Snapshot, StoreError> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT records, version FROM collections WHERE kind = ?",
                [kind.key()],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((body, version)) = row else {
            return Ok(Snapshot::default());
        };

        let raw: Vec<Value> = serde_json::from_str(&body)?;
        let mut records = Vec::with_capacity(raw.len());
        for (i, item) in raw.into_iter().enumerate() {
            match item {
                Value::Object(map) => records.push(legacy::canonicalize(kind, map)),
                other => {
                    warn!(kind = kind.key(), index = i, value = %other, "skipping non-object entry");
                }
            }
        }
        Ok(Snapshot { records, version })
    }

    fn write(
        &mut self,
        kind: Collection,
        records: &[Record],
        expected_version: Option<i64>,
    ) -> Result<i64, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let next = checked_upsert(&tx, kind, records, expected_version)?;
        tx.commit()?;
        debug!(kind = kind.key(), records = records.len(), version = next, "collection written");
        Ok(next)
    }

    fn write_batch(&mut self, batch: &[ConditionalWrite]) -> Result<Vec<i64>, StoreError> {
        // Dropping the transaction on error rolls back earlier entries.
        let tx = self.conn.unchecked_transaction()?;
        let mut versions = Vec::with_capacity(batch.len());
        for w in batch {
            versions.push(checked_upsert(&tx, w.kind, &w.records, w.expected_version)?);
        }
        tx.commit()?;
        debug!(collections = batch.len(), "collection batch written");
        Ok(versions)
    }

    fn replace_collections(&mut self, batch: &[(Collection, Vec<Record>)]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for (kind, records) in batch {
            let next = current_version(&tx, *kind)? + 1;
            upsert(&tx, *kind, records, next)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        conn
    }

    #[test]
    fn missing_collection_reads_as_empty_version_zero() {
        let conn = conn();
        let store = SqliteStore::new(&conn);
        let snap = store.load(Collection::Files).expect("load");
        assert!(snap.records.is_empty());
        assert_eq!(snap.version, 0);
    }

    #[test]
    fn create_assigns_id_and_get_finds_it() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        let created = store
            .create(Collection::Courses, record(json!({"course_name": "Data Structures"})))
            .expect("create");
        let id = created.get("id").and_then(|v| v.as_str()).expect("id").to_string();
        assert!(!id.is_empty());

        let fetched = store.get(Collection::Courses, &id).expect("get");
        assert_eq!(fetched.get("course_name"), Some(&json!("Data Structures")));

        let dup = store.create(Collection::Courses, record(json!({"id": id})));
        assert!(matches!(dup, Err(StoreError::DuplicateId { .. })));
    }

    #[test]
    fn update_merges_patch_but_keeps_id() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(Collection::Files, &[record(json!({"id": "f1", "status": "pending"}))])
            .expect("seed");
        let updated = store
            .update(
                Collection::Files,
                "f1",
                &record(json!({"id": "other", "status": "approved", "download_count": 3})),
            )
            .expect("update");
        assert_eq!(updated.get("id"), Some(&json!("f1")));
        assert_eq!(updated.get("status"), Some(&json!("approved")));

        let missing = store.update(Collection::Files, "nope", &Record::new());
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_and_filter() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Users,
                &[
                    record(json!({"id": "u1", "role": "admin"})),
                    record(json!({"id": "u2", "role": "student"})),
                    record(json!({"id": "u3", "role": "admin"})),
                ],
            )
            .expect("seed");
        let admins = store
            .filter(Collection::Users, &record(json!({"role": "admin"})))
            .expect("filter");
        assert_eq!(admins.len(), 2);

        store.delete(Collection::Users, "u1").expect("delete");
        assert!(matches!(
            store.delete(Collection::Users, "u1"),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.list(Collection::Users).expect("list").len(), 2);
    }

    #[test]
    fn stale_conditional_write_is_rejected_and_leaves_data_untouched() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        let v1 = store
            .set_all(Collection::Students, &[record(json!({"id": "s1"}))])
            .expect("first write");
        assert_eq!(v1, 1);
        let v2 = store
            .set_all(Collection::Students, &[record(json!({"id": "s2"}))])
            .expect("second write");
        assert_eq!(v2, 2);

        let err = store
            .write(Collection::Students, &[], Some(v1))
            .expect_err("stale write");
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        let ids: Vec<_> = store
            .list(Collection::Students)
            .expect("list")
            .into_iter()
            .filter_map(|r| r.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![json!("s2")]);
    }

    #[test]
    fn numeric_ids_are_found_and_kept() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(Collection::Students, &[record(json!({"id": 7, "national_id": "111111111"}))])
            .expect("seed");
        let created = store
            .create(Collection::Students, record(json!({"id": 42, "national_id": "222222222"})))
            .expect("create");
        assert_eq!(created.get("id"), Some(&json!(42)));

        let fetched = store.get(Collection::Students, "42").expect("get");
        assert_eq!(fetched.get("national_id"), Some(&json!("222222222")));
        let updated = store
            .update(Collection::Students, "7", &record(json!({"national_id": "333333333"})))
            .expect("update");
        assert_eq!(updated.get("id"), Some(&json!(7)));
        assert!(matches!(
            store.create(Collection::Students, record(json!({"id": "42"}))),
            Err(StoreError::DuplicateId { .. })
        ));

        store.delete(Collection::Students, "42").expect("delete");
        let ids: Vec<_> = store
            .list(Collection::Students)
            .expect("list")
            .into_iter()
            .filter_map(|r| r.get("id").cloned())
            .collect();
        assert_eq!(ids, vec![json!(7)]);
    }

    #[test]
    fn batch_write_with_one_stale_version_writes_nothing() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        let courses_v = store
            .set_all(Collection::Courses, &[record(json!({"id": "c1"}))])
            .expect("courses");
        store
            .set_all(Collection::Courses, &[record(json!({"id": "c2"}))])
            .expect("concurrent courses write");

        let err = store
            .write_batch(&[
                ConditionalWrite {
                    kind: Collection::Lecturers,
                    records: vec![record(json!({"id": "l1"}))],
                    expected_version: Some(0),
                },
                ConditionalWrite {
                    kind: Collection::Courses,
                    records: vec![record(json!({"id": "c1", "lecturer_ids": ["l1"]}))],
                    expected_version: Some(courses_v),
                },
            ])
            .expect_err("stale batch");
        assert!(matches!(err, StoreError::Conflict { kind: "courses", .. }));
        let snap = store.load(Collection::Lecturers).expect("lecturers");
        assert!(snap.records.is_empty());
        assert_eq!(snap.version, 0);

        let versions = store
            .write_batch(&[ConditionalWrite {
                kind: Collection::Lecturers,
                records: vec![record(json!({"id": "l1"}))],
                expected_version: Some(0),
            }])
            .expect("fresh batch");
        assert_eq!(versions, vec![1]);
    }

    #[test]
    fn load_applies_the_legacy_adapter() {
        let conn = conn();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Courses,
                &[record(json!({"id": "c1", "name": "Physics I", "code": "PHYS101"}))],
            )
            .expect("seed");
        let course = store.get(Collection::Courses, "c1").expect("get");
        assert_eq!(course.get("course_code"), Some(&json!("PHYS101")));
        assert_eq!(course.get("course_name"), Some(&json!("Physics I")));
    }
}
