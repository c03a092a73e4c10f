use crate::codes::AdminCodeSequencer;
use crate::lecturers;
use crate::models::{
    decode_all, is_blank, Collection, Course, Entity, FileRecord, Lecturer, Message, Notification,
    Record, User,
};
use crate::normalize::{
    self, course_code_index, normalize_admin, normalize_course, normalize_file,
    normalize_lecturer, FileContext, Repair,
};
use crate::store::{ConditionalWrite, EntityStore, Snapshot, StoreError};
use crate::tracks::TrackCatalog;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Why a record was dropped instead of repaired. None of these has a safe
/// default value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum Unrepairable {
    #[error("missing display name")]
    MissingDisplayName,
    #[error("missing course id")]
    MissingCourseId,
    #[error("missing uploader id")]
    MissingUploaderId,
    #[error("missing subject")]
    MissingSubject,
    #[error("missing content")]
    MissingContent,
    #[error("missing sender")]
    MissingSender,
    #[error("missing message")]
    MissingMessage,
    #[error("missing user id")]
    MissingUserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Repairable,
    Unrepairable(Unrepairable),
}

/// Only missing text fields make a file unrepairable. Role, status, code
/// and timestamps always have a default.
pub fn classify_file(file: &FileRecord) -> Result<(), Unrepairable> {
    if is_blank(file.original_name.as_deref()) {
        return Err(Unrepairable::MissingDisplayName);
    }
    if is_blank(file.course_id.as_deref()) {
        return Err(Unrepairable::MissingCourseId);
    }
    if is_blank(file.uploader_id.as_deref()) {
        return Err(Unrepairable::MissingUploaderId);
    }
    Ok(())
}

pub fn classify_message(message: &Message) -> Result<(), Unrepairable> {
    if is_blank(message.subject.as_deref()) {
        return Err(Unrepairable::MissingSubject);
    }
    if is_blank(message.content.as_deref()) {
        return Err(Unrepairable::MissingContent);
    }
    if is_blank(message.sender_id.as_deref()) {
        return Err(Unrepairable::MissingSender);
    }
    Ok(())
}

pub fn classify_notification(notification: &Notification) -> Result<(), Unrepairable> {
    if is_blank(notification.message.as_deref()) {
        return Err(Unrepairable::MissingMessage);
    }
    if is_blank(notification.user_id.as_deref()) {
        return Err(Unrepairable::MissingUserId);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Removal {
    pub id: Option<String>,
    pub reason: Unrepairable,
    pub record: Record,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub kind: Collection,
    pub kept: Vec<Record>,
    pub removed: Vec<Removal>,
    pub repaired: usize,
    /// Lecturer ids created while linking courses (track ids in a dry run).
    pub synthesized_lecturers: Vec<String>,
    /// Lecturers built while linking courses, not yet stored.
    pub new_lecturers: Vec<Record>,
    lecturer_base: Option<Snapshot>,
    verdicts: Vec<Verdict>,
}

impl Reconciliation {
    fn new(kind: Collection) -> Self {
        Self {
            kind,
            kept: Vec::new(),
            removed: Vec::new(),
            repaired: 0,
            synthesized_lecturers: Vec::new(),
            new_lecturers: Vec::new(),
            lecturer_base: None,
            verdicts: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        self.repaired > 0 || !self.removed.is_empty()
    }

    /// The lecturer collection with the synthesized lecturers appended,
    /// conditional on the version it was read at. `None` when nothing was
    /// synthesized.
    pub fn lecturer_write(&self) -> Option<ConditionalWrite> {
        if self.new_lecturers.is_empty() {
            return None;
        }
        let base = self.lecturer_base.as_ref()?;
        let mut records = base.records.clone();
        records.extend(self.new_lecturers.iter().cloned());
        Some(ConditionalWrite {
            kind: Collection::Lecturers,
            records,
            expected_version: Some(base.version),
        })
    }

    /// Removal counts keyed by the human-readable reason.
    pub fn reason_counts(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for r in &self.removed {
            *out.entry(r.reason.to_string()).or_insert(0) += 1;
        }
        out
    }

    /// One verdict per input record, in input order.
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    fn keep<T: Entity>(&mut self, record: T, repairs: &[Repair]) -> Result<(), StoreError> {
        if repairs.is_empty() {
            self.verdicts.push(Verdict::Valid);
        } else {
            self.repaired += 1;
            self.verdicts.push(Verdict::Repairable);
            debug!(
                kind = self.kind.key(),
                id = record.id().unwrap_or(""),
                repairs = ?repairs,
                "record repaired"
            );
        }
        self.kept.push(record.into_record()?);
        Ok(())
    }

    fn keep_raw(&mut self, record: Record) {
        self.verdicts.push(Verdict::Valid);
        self.kept.push(record);
    }

    fn remove<T: Entity>(&mut self, record: T, reason: Unrepairable) -> Result<(), StoreError> {
        let id = record.id().map(str::to_string);
        warn!(
            kind = self.kind.key(),
            id = id.as_deref().unwrap_or(""),
            reason = %reason,
            "removing unrepairable record"
        );
        self.verdicts.push(Verdict::Unrepairable(reason));
        self.removed.push(Removal {
            id,
            reason,
            record: record.into_record()?,
        });
        Ok(())
    }
}

/// A course's link to the lecturer covering its track.
enum Link {
    Id(String),
    /// Dry run: a lecturer would be synthesized and linked.
    Planned,
}

/// Brings a whole collection into line with its invariants.
///
/// The store is only read. Persisting `kept`, together with any lecturers
/// synthesized for courses (`Reconciliation::lecturer_write`), is the
/// caller's job. With `dry_run` set no lecturer is built; the course still
/// counts the link repair it would get.
pub struct Reconciler<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    catalog: &'a TrackCatalog,
    email_domain: &'a str,
    now: String,
    dry_run: bool,
}

impl<'a, S: EntityStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, catalog: &'a TrackCatalog, email_domain: &'a str) -> Self {
        Self {
            store,
            catalog,
            email_domain,
            now: normalize::now_stamp(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reconcile(
        &mut self,
        kind: Collection,
        records: Vec<Record>,
    ) -> Result<Reconciliation, StoreError> {
        let mut out = Reconciliation::new(kind);
        match kind {
            Collection::Files => self.reconcile_files(records, &mut out)?,
            Collection::Courses => self.reconcile_courses(records, &mut out)?,
            Collection::Lecturers => {
                for l in decode_all::<Lecturer>(records)? {
                    let n = normalize_lecturer(&l);
                    out.keep(n.record, &n.repairs)?;
                }
            }
            Collection::Users => reconcile_users(records, &mut out)?,
            Collection::Messages => {
                for m in decode_all::<Message>(records)? {
                    match classify_message(&m) {
                        Ok(()) => out.keep(m, &[])?,
                        Err(reason) => out.remove(m, reason)?,
                    }
                }
            }
            Collection::Notifications => {
                for n in decode_all::<Notification>(records)? {
                    match classify_notification(&n) {
                        Ok(()) => out.keep(n, &[])?,
                        Err(reason) => out.remove(n, reason)?,
                    }
                }
            }
            // Student duplicates are handled by deduplication, not here.
            Collection::Students => {
                for r in records {
                    out.keep_raw(r);
                }
            }
        }
        Ok(out)
    }

    fn reconcile_files(
        &mut self,
        records: Vec<Record>,
        out: &mut Reconciliation,
    ) -> Result<(), StoreError> {
        let files: Vec<FileRecord> = decode_all(records)?;
        let courses: Vec<Course> = decode_all(self.store.list(Collection::Courses)?)?;
        let course_codes = course_code_index(&courses);

        let mut existing: BTreeSet<String> = files
            .iter()
            .filter_map(|f| f.file_code.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        let mut claimed: HashSet<String> = HashSet::new();

        for mut file in files {
            if let Err(reason) = classify_file(&file) {
                out.remove(file, reason)?;
                continue;
            }
            // A later holder of an already claimed code gets a fresh one.
            if let Some(code) = file.file_code.clone().filter(|c| !c.trim().is_empty()) {
                if !claimed.insert(code) {
                    file.file_code = None;
                }
            }
            let ctx = FileContext {
                course_codes: &course_codes,
                existing_codes: &existing,
                now: &self.now,
            };
            let n = normalize_file(&file, &ctx);
            if let Some(code) = &n.record.file_code {
                existing.insert(code.clone());
                claimed.insert(code.clone());
            }
            out.keep(n.record, &n.repairs)?;
        }
        Ok(())
    }

    fn reconcile_courses(
        &mut self,
        records: Vec<Record>,
        out: &mut Reconciliation,
    ) -> Result<(), StoreError> {
        let courses: Vec<Course> = decode_all(records)?;
        let base = self.store.load(Collection::Lecturers)?;
        let mut staff: Vec<Lecturer> = decode_all(base.records.clone())?;
        out.lecturer_base = Some(base);

        let mut existing: BTreeSet<String> = courses
            .iter()
            .filter_map(|c| c.course_code.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        let mut claimed: HashSet<String> = HashSet::new();

        for mut course in courses {
            let mut duplicate_code = false;
            if let Some(code) = course.course_code.clone().filter(|c| !c.trim().is_empty()) {
                if !claimed.insert(code) {
                    course.course_code = None;
                    duplicate_code = true;
                }
            }

            let n = normalize_course(&course, &existing);
            let mut course = n.record;
            let mut repairs = n.repairs;
            if duplicate_code && !repairs.contains(&Repair::CourseCode) {
                repairs.push(Repair::CourseCode);
            }
            if let Some(code) = &course.course_code {
                existing.insert(code.clone());
                claimed.insert(code.clone());
            }

            let before = course.lecturer_ids.len();
            course
                .lecturer_ids
                .retain(|id| staff.iter().any(|l| l.id.as_deref() == Some(id.as_str())));
            if course.lecturer_ids.len() != before {
                repairs.push(Repair::LecturerLink);
            }

            let covering = course
                .academic_track_ids
                .iter()
                .find_map(|t| lecturers::find_for_track(&staff, t))
                .and_then(|l| l.id.clone())
                .map(Link::Id);
            let covering = match covering {
                Some(link) => Some(link),
                None => match course.academic_track_ids.first().cloned() {
                    Some(track_id) => self.synthesize_lecturer(&track_id, &mut staff, out)?,
                    None => None,
                },
            };
            if course.lecturer_ids.is_empty() {
                if let Some(link) = covering {
                    if let Link::Id(id) = link {
                        course.lecturer_ids.push(id);
                    }
                    if !repairs.contains(&Repair::LecturerLink) {
                        repairs.push(Repair::LecturerLink);
                    }
                }
            }

            out.keep(course, &repairs)?;
        }
        Ok(())
    }

    fn synthesize_lecturer(
        &mut self,
        track_id: &str,
        staff: &mut Vec<Lecturer>,
        out: &mut Reconciliation,
    ) -> Result<Option<Link>, StoreError> {
        let Some(track) = self.catalog.get(track_id) else {
            warn!(track_id, "no academic track for lecturer synthesis");
            return Ok(None);
        };
        if self.dry_run {
            if !out.synthesized_lecturers.iter().any(|t| t == track_id) {
                out.synthesized_lecturers.push(track_id.to_string());
            }
            return Ok(Some(Link::Planned));
        }

        let lecturer = lecturers::synthesize(track, self.email_domain, &mut rand::thread_rng());
        let Some(id) = lecturer.id.clone() else {
            return Ok(None);
        };
        info!(track_id, lecturer_id = %id, "synthesized lecturer for course track");
        out.synthesized_lecturers.push(id.clone());
        out.new_lecturers.push(lecturer.clone().into_record()?);
        staff.push(lecturer);
        Ok(Some(Link::Id(id)))
    }
}

fn reconcile_users(records: Vec<Record>, out: &mut Reconciliation) -> Result<(), StoreError> {
    let users: Vec<User> = decode_all(records)?;
    let mut sequencer = AdminCodeSequencer::from_existing(
        users
            .iter()
            .filter(|u| u.is_admin())
            .filter_map(|u| u.admin_id.as_deref()),
    );
    let mut claimed: HashSet<String> = HashSet::new();

    for mut user in users {
        let mut duplicate_code = false;
        if user.is_admin() {
            if let Some(code) = user.admin_id.clone().filter(|c| !c.trim().is_empty()) {
                if !claimed.insert(code) {
                    user.admin_id = None;
                    duplicate_code = true;
                }
            }
        }
        let n = normalize_admin(&user, &mut sequencer);
        let mut repairs = n.repairs;
        if duplicate_code && !repairs.contains(&Repair::AdminCode) {
            repairs.push(Repair::AdminCode);
        }
        if let Some(code) = &n.record.admin_id {
            if n.record.is_admin() {
                claimed.insert(code.clone());
            }
        }
        out.keep(n.record, &repairs)?;
    }
    Ok(())
}
