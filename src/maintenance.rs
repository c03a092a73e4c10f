use crate::models::{decode_all, Collection, Student};
use crate::reconcile::{Reconciler, Reconciliation, Removal, Verdict};
use crate::seed::SeedProvider;
use crate::store::{ConditionalWrite, EntityStore, StoreError};
use crate::tracks::TrackCatalog;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    #[error("deduplication is not supported for {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MaintenanceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "not_supported",
            Self::Store(e) => e.code(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Unsupported(kind) => Some(json!({ "kind": kind })),
            Self::Store(e) => e.details(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicateReport {
    pub kind: &'static str,
    pub removed: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveInvalidReport {
    pub kind: &'static str,
    pub removed: usize,
    pub fixed: usize,
    pub kept: usize,
    /// Records that needed neither repair nor removal.
    pub untouched: usize,
    pub reasons: BTreeMap<String, usize>,
    /// The dropped records with their reasons, for diagnostics.
    pub removals: Vec<Removal>,
    pub synthesized_lecturers: Vec<String>,
    pub version: i64,
}

impl RemoveInvalidReport {
    fn from_reconciliation(result: Reconciliation, version: i64) -> Self {
        let untouched = result
            .verdicts()
            .iter()
            .filter(|v| **v == Verdict::Valid)
            .count();
        let reasons = result.reason_counts();
        Self {
            kind: result.kind.key(),
            removed: result.removed.len(),
            fixed: result.repaired,
            kept: result.kept.len(),
            untouched,
            reasons,
            removals: result.removed,
            synthesized_lecturers: result.synthesized_lecturers,
            version,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    pub kind: &'static str,
    pub cleared: usize,
}

/// Drops every student after the first with the same national id. Students
/// without a national id are never treated as duplicates.
pub fn deduplicate<S: EntityStore + ?Sized>(
    store: &mut S,
    kind: Collection,
) -> Result<DeduplicateReport, MaintenanceError> {
    if kind != Collection::Students {
        return Err(MaintenanceError::Unsupported(kind.key()));
    }

    let snap = store.load(kind)?;
    let students: Vec<Student> = decode_all(snap.records.clone()).map_err(StoreError::from)?;
    let total = snap.records.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(total);
    for (record, student) in snap.records.into_iter().zip(students) {
        let key = student
            .national_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match key {
            Some(k) if !seen.insert(k.to_string()) => {
                info!(
                    id = student.id.as_deref().unwrap_or(""),
                    national_id = k,
                    "dropping duplicate student"
                );
            }
            _ => kept.push(record),
        }
    }

    let removed = total - kept.len();
    if removed > 0 {
        store.write(kind, &kept, Some(snap.version))?;
    }
    info!(kind = kind.key(), removed, remaining = kept.len(), "deduplicate finished");
    Ok(DeduplicateReport {
        kind: kind.key(),
        removed,
        remaining: kept.len(),
    })
}

/// Strict reconciliation of one collection: unrepairable records go,
/// repairable ones are fixed, and the result is written back only if
/// something changed. Lecturers synthesized for courses are stored in the
/// same conditional batch, so a conflict leaves both collections as read.
pub fn remove_invalid<S: EntityStore + ?Sized>(
    store: &mut S,
    catalog: &TrackCatalog,
    email_domain: &str,
    kind: Collection,
) -> Result<RemoveInvalidReport, MaintenanceError> {
    let snap = store.load(kind)?;
    let result = Reconciler::new(&*store, catalog, email_domain).reconcile(kind, snap.records)?;

    let mut batch = Vec::new();
    if result.changed() {
        batch.push(ConditionalWrite {
            kind,
            records: result.kept.clone(),
            expected_version: Some(snap.version),
        });
    }
    batch.extend(result.lecturer_write());
    let version = if batch.is_empty() {
        snap.version
    } else {
        let versions = store.write_batch(&batch)?;
        match batch.iter().position(|w| w.kind == kind) {
            Some(i) => versions[i],
            None => snap.version,
        }
    };

    let report = RemoveInvalidReport::from_reconciliation(result, version);
    info!(
        kind = kind.key(),
        removed = report.removed,
        fixed = report.fixed,
        kept = report.kept,
        "remove invalid finished"
    );
    Ok(report)
}

/// Same classification as `remove_invalid` without writing anything.
pub fn reconcile_preview<S: EntityStore + ?Sized>(
    store: &S,
    catalog: &TrackCatalog,
    email_domain: &str,
    kind: Collection,
) -> Result<RemoveInvalidReport, MaintenanceError> {
    let snap = store.load(kind)?;
    let result = Reconciler::new(store, catalog, email_domain)
        .dry_run(true)
        .reconcile(kind, snap.records)?;
    Ok(RemoveInvalidReport::from_reconciliation(result, snap.version))
}

pub fn clear_entity<S: EntityStore + ?Sized>(
    store: &mut S,
    kind: Collection,
) -> Result<ClearReport, MaintenanceError> {
    let cleared = store.list(kind)?.len();
    store.set_all(kind, &[])?;
    info!(kind = kind.key(), cleared, "collection cleared");
    Ok(ClearReport {
        kind: kind.key(),
        cleared,
    })
}

/// Empties every collection and writes the seed dataset in its place.
/// Returns the seeded record count per collection.
pub fn refresh_all<S, P>(
    store: &mut S,
    catalog: &TrackCatalog,
    seed: &mut P,
) -> Result<BTreeMap<&'static str, usize>, MaintenanceError>
where
    S: EntityStore + ?Sized,
    P: SeedProvider + ?Sized,
{
    let mut seeded = seed.generate(catalog);
    for kind in Collection::ALL {
        if !seeded.iter().any(|(k, _)| *k == kind) {
            seeded.push((kind, Vec::new()));
        }
    }
    store.replace_collections(&seeded)?;

    let counts: BTreeMap<&'static str, usize> =
        seeded.iter().map(|(k, r)| (k.key(), r.len())).collect();
    info!(counts = ?counts, "all data refreshed");
    Ok(counts)
}

/// Diagnostic dump of every collection.
pub fn export_all<S: EntityStore + ?Sized>(store: &S) -> Result<Value, StoreError> {
    let mut collections = Map::new();
    let mut versions = Map::new();
    for kind in Collection::ALL {
        let snap = store.load(kind)?;
        collections.insert(
            kind.key().to_string(),
            Value::Array(snap.records.into_iter().map(Value::Object).collect()),
        );
        versions.insert(kind.key().to_string(), json!(snap.version));
    }
    Ok(json!({
        "exportedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "collections": collections,
        "versions": versions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::Record;
    use crate::seed::SampleDataset;
    use crate::store::SqliteStore;
    use rusqlite::Connection;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    fn setup() -> (Connection, TrackCatalog) {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        (conn, TrackCatalog::embedded().expect("tracks"))
    }

    #[test]
    fn duplicate_national_ids_keep_the_first_occurrence() {
        let (conn, _) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Students,
                &[
                    record(json!({"id": "s1", "national_id": "123456789"})),
                    record(json!({"id": "s2", "national_id": "987654321"})),
                    record(json!({"id": "s3", "national_id": "123456789"})),
                    record(json!({"id": "s4"})),
                    record(json!({"id": "s5", "national_id": ""})),
                ],
            )
            .expect("seed");

        let report = deduplicate(&mut store, Collection::Students).expect("dedupe");
        assert_eq!(report.removed, 1);
        assert_eq!(report.remaining, 4);
        let ids: Vec<_> = store
            .list(Collection::Students)
            .expect("list")
            .iter()
            .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["s1", "s2", "s4", "s5"]);

        let again = deduplicate(&mut store, Collection::Students).expect("dedupe again");
        assert_eq!(again.removed, 0);
    }

    #[test]
    fn deduplicate_rejects_other_collections() {
        let (conn, _) = setup();
        let mut store = SqliteStore::new(&conn);
        let err = deduplicate(&mut store, Collection::Files).expect_err("unsupported");
        assert_eq!(err.code(), "not_supported");
    }

    #[test]
    fn remove_invalid_is_idempotent() {
        let (conn, catalog) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Courses,
                &[
                    record(json!({"id": "c1", "course_code": "CS101"})),
                    record(json!({"id": "c2", "name": "Torts", "code": "LAW210"})),
                ],
            )
            .expect("courses");
        store
            .set_all(
                Collection::Files,
                &[
                    record(json!({"id": "f1", "original_name": "Midterm", "course_id": "c1", "file_type": "exam", "uploader_id": "u1"})),
                    record(json!({"id": "f2", "title": "", "course_id": "c1", "uploader_id": "u1"})),
                    record(json!({"id": "f3", "filename": "summary.pdf", "course_id": "c2", "uploader_id": "u2", "file_type": "note"})),
                ],
            )
            .expect("files");

        for kind in [Collection::Courses, Collection::Files] {
            let first = remove_invalid(&mut store, &catalog, "university.edu", kind).expect("first");
            let after_first = store.list(kind).expect("list");
            let second =
                remove_invalid(&mut store, &catalog, "university.edu", kind).expect("second");
            assert_eq!(second.removed, 0, "{kind:?}");
            assert_eq!(second.fixed, 0, "{kind:?}");
            assert_eq!(second.version, first.version);
            assert_eq!(store.list(kind).expect("list"), after_first);
        }

        let files = store.list(Collection::Files).expect("files");
        assert_eq!(files.len(), 2);
        let codes: Vec<_> = files
            .iter()
            .filter_map(|f| f.get("file_code").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(codes, vec!["CS101-E001", "LAW210-N001"]);
    }

    #[test]
    fn stale_version_aborts_without_partial_write() {
        let (conn, catalog) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Messages,
                &[record(json!({"id": "m1", "subject": "", "content": "x", "sender_id": "s"}))],
            )
            .expect("seed");
        // A second writer lands between the read and the write.
        let snap = store.load(Collection::Messages).expect("load");
        store
            .set_all(Collection::Messages, &snap.records)
            .expect("concurrent write");
        let err = store
            .write(Collection::Messages, &[], Some(snap.version))
            .expect_err("conflict");
        assert_eq!(err.code(), "conflict");
        assert_eq!(store.list(Collection::Messages).expect("list").len(), 1);

        let report = remove_invalid(&mut store, &catalog, "university.edu", Collection::Messages)
            .expect("fresh run");
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn preview_counts_match_the_real_run() {
        let (conn, catalog) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Courses,
                &[
                    record(json!({"id": "c1", "course_name": "Contracts", "course_code": "LAW101", "academic_track_ids": ["law-undergrad"], "credits": 3})),
                    record(json!({"id": "c2", "course_name": "Torts", "course_code": "LAW102", "academic_track_ids": ["law-undergrad"], "credits": 3})),
                ],
            )
            .expect("courses");

        let preview = reconcile_preview(&store, &catalog, "university.edu", Collection::Courses)
            .expect("preview");
        assert!(store.list(Collection::Lecturers).expect("lecturers").is_empty());
        let report = remove_invalid(&mut store, &catalog, "university.edu", Collection::Courses)
            .expect("remove invalid");

        assert_eq!(preview.fixed, 2);
        assert_eq!(preview.fixed, report.fixed);
        assert_eq!(preview.untouched, report.untouched);
        assert_eq!(preview.removed, report.removed);
        assert_eq!(preview.kept, report.kept);
        assert_eq!(preview.synthesized_lecturers, vec!["law-undergrad".to_string()]);
        assert_eq!(report.synthesized_lecturers.len(), 1);

        let lecturers = store.list(Collection::Lecturers).expect("lecturers");
        assert_eq!(lecturers.len(), 1);
        let lecturer_id = lecturers[0].get("id").cloned().expect("id");
        for course in store.list(Collection::Courses).expect("courses") {
            assert_eq!(course.get("lecturer_ids"), Some(&json!([lecturer_id.clone()])));
        }
    }

    /// Bumps the courses version whenever lecturers are read, the way a
    /// second writer landing mid-reconcile would.
    struct RacingStore<'c> {
        inner: SqliteStore<'c>,
        conn: &'c Connection,
    }

    impl EntityStore for RacingStore<'_> {
        fn load(&self, kind: Collection) -> Result<crate::store::Snapshot, StoreError> {
            if kind == Collection::Lecturers {
                self.conn
                    .execute(
                        "UPDATE collections SET version = version + 1 WHERE kind = 'courses'",
                        [],
                    )
                    .expect("bump courses");
            }
            self.inner.load(kind)
        }

        fn write(
            &mut self,
            kind: Collection,
            records: &[Record],
            expected_version: Option<i64>,
        ) -> Result<i64, StoreError> {
            self.inner.write(kind, records, expected_version)
        }

        fn write_batch(&mut self, batch: &[ConditionalWrite]) -> Result<Vec<i64>, StoreError> {
            self.inner.write_batch(batch)
        }
    }

    #[test]
    fn course_conflict_keeps_synthesized_lecturers_out() {
        let (conn, catalog) = setup();
        SqliteStore::new(&conn)
            .set_all(
                Collection::Courses,
                &[record(json!({"id": "c1", "course_code": "LAW101", "academic_track_ids": ["law-undergrad"], "credits": 3}))],
            )
            .expect("courses");

        let mut racing = RacingStore {
            inner: SqliteStore::new(&conn),
            conn: &conn,
        };
        let err = remove_invalid(&mut racing, &catalog, "university.edu", Collection::Courses)
            .expect_err("conflict");
        assert_eq!(err.code(), "conflict");

        let store = SqliteStore::new(&conn);
        let lecturers = store.load(Collection::Lecturers).expect("lecturers");
        assert!(lecturers.records.is_empty());
        assert_eq!(lecturers.version, 0);
        let courses = store.list(Collection::Courses).expect("courses");
        assert_eq!(courses[0].get("lecturer_ids"), None);
    }

    #[test]
    fn refreshed_dataset_needs_no_repairs() {
        let (conn, catalog) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(Collection::Files, &[record(json!({"id": "junk"}))])
            .expect("junk");
        let mut seed = SampleDataset {
            email_domain: "university.edu".into(),
        };
        let counts = refresh_all(&mut store, &catalog, &mut seed).expect("refresh");
        assert!(counts["courses"] > 0);

        for kind in Collection::ALL {
            let report = remove_invalid(&mut store, &catalog, "university.edu", kind).expect("check");
            assert_eq!(report.removed, 0, "{kind:?}");
            assert_eq!(report.fixed, 0, "{kind:?}");
            assert_eq!(report.untouched, report.kept, "{kind:?}");
        }
        assert!(deduplicate(&mut store, Collection::Students).expect("dedupe").removed == 0);
    }

    #[test]
    fn clear_and_export() {
        let (conn, _) = setup();
        let mut store = SqliteStore::new(&conn);
        store
            .set_all(
                Collection::Notifications,
                &[record(json!({"id": "n1", "message": "hi", "user_id": "s1"}))],
            )
            .expect("seed");
        let report = clear_entity(&mut store, Collection::Notifications).expect("clear");
        assert_eq!(report.cleared, 1);

        let dump = export_all(&store).expect("export");
        assert_eq!(dump["collections"]["notifications"], json!([]));
        assert_eq!(dump["versions"]["notifications"], json!(2));
        assert_eq!(dump["versions"]["files"], json!(0));
    }
}
