use crate::codes::{self, AdminCodeSequencer};
use crate::models::{
    is_blank, Collection, Course, Entity, FileRecord, FileStatus, FileType, Lecturer, Record,
    UploaderRole, User,
};
use crate::store::{EntityStore, StoreError};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

pub const DEFAULT_TRACK: &str = "cs-undergrad";
pub const DEFAULT_CREDITS: i64 = 3;
pub const CREDITS_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

// course code prefix -> track assumed for courses that lost their tracks
const TRACK_BY_CODE_PREFIX: &[(&str, &str)] = &[
    ("CS", "cs-undergrad"),
    ("SE", "swe-undergrad"),
    ("MATH", "math-undergrad"),
    ("PHYS", "physics-undergrad"),
    ("LAW", "law-undergrad"),
    ("BUS", "business-undergrad"),
    ("PSY", "psychology-undergrad"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Repair {
    FileCode,
    UploaderType,
    Status,
    CreatedAt,
    UpdatedAt,
    DownloadCount,
    AcademicTracks,
    CourseCode,
    Credits,
    LecturerLink,
    AdminCode,
}

#[derive(Debug, Clone)]
pub struct Normalized<T> {
    pub record: T,
    pub repairs: Vec<Repair>,
}

impl<T> Normalized<T> {
    fn unchanged(record: T) -> Self {
        Self {
            record,
            repairs: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        !self.repairs.is_empty()
    }
}

pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// What a file repair needs to know about the rest of the dataset.
pub struct FileContext<'a> {
    /// course id -> course code
    pub course_codes: &'a HashMap<String, String>,
    pub existing_codes: &'a BTreeSet<String>,
    pub now: &'a str,
}

pub fn normalize_file(file: &FileRecord, ctx: &FileContext<'_>) -> Normalized<FileRecord> {
    let mut out = file.clone();
    let mut repairs = Vec::new();

    if is_blank(out.file_code.as_deref()) {
        let course_code = out
            .course_id
            .as_deref()
            .and_then(|id| ctx.course_codes.get(id.trim()))
            .map(String::as_str);
        let file_type = FileType::classify(out.file_type.as_deref());
        out.file_code = Some(codes::file_code(
            course_code,
            file_type,
            ctx.existing_codes.iter().map(String::as_str),
        ));
        repairs.push(Repair::FileCode);
    }

    if out.uploader_type.as_deref().and_then(UploaderRole::parse).is_none() {
        out.uploader_type = Some(UploaderRole::Student.as_str().to_string());
        repairs.push(Repair::UploaderType);
    }

    if out.status.as_deref().and_then(FileStatus::parse).is_none() {
        out.status = Some(FileStatus::Pending.as_str().to_string());
        repairs.push(Repair::Status);
    }

    if is_blank(out.created_at.as_deref()) {
        out.created_at = Some(ctx.now.to_string());
        repairs.push(Repair::CreatedAt);
    }
    if is_blank(out.updated_at.as_deref()) {
        out.updated_at = Some(ctx.now.to_string());
        repairs.push(Repair::UpdatedAt);
    }

    if !matches!(out.download_count, Some(n) if n >= 0) {
        out.download_count = Some(0);
        repairs.push(Repair::DownloadCount);
    }

    Normalized {
        record: out,
        repairs,
    }
}

pub fn track_for_course_code(course_code: Option<&str>) -> &'static str {
    let code = course_code.unwrap_or("").trim().to_ascii_uppercase();
    TRACK_BY_CODE_PREFIX
        .iter()
        .find(|(prefix, _)| code.starts_with(prefix))
        .map(|(_, track)| *track)
        .unwrap_or(DEFAULT_TRACK)
}

pub fn normalize_course(course: &Course, existing_codes: &BTreeSet<String>) -> Normalized<Course> {
    let mut out = course.clone();
    let mut repairs = Vec::new();

    if out.academic_track_ids.is_empty() {
        let track = match out.academic_track.as_deref().map(str::trim) {
            Some(legacy) if !legacy.is_empty() => legacy.to_string(),
            _ => track_for_course_code(out.course_code.as_deref()).to_string(),
        };
        out.academic_track_ids = vec![track];
        repairs.push(Repair::AcademicTracks);
    }

    if is_blank(out.course_code.as_deref()) {
        let track = out
            .academic_track_ids
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_TRACK);
        out.course_code = Some(codes::course_code(
            track,
            existing_codes.iter().map(String::as_str),
        ));
        repairs.push(Repair::CourseCode);
    }

    match out.credits {
        Some(n) if CREDITS_RANGE.contains(&n) => {}
        Some(n) => {
            out.credits = Some(n.clamp(*CREDITS_RANGE.start(), *CREDITS_RANGE.end()));
            repairs.push(Repair::Credits);
        }
        None => {
            out.credits = Some(DEFAULT_CREDITS);
            repairs.push(Repair::Credits);
        }
    }

    Normalized {
        record: out,
        repairs,
    }
}

pub fn normalize_lecturer(lecturer: &Lecturer) -> Normalized<Lecturer> {
    if !lecturer.academic_track_ids.is_empty() {
        return Normalized::unchanged(lecturer.clone());
    }
    let mut out = lecturer.clone();
    let track = match out.academic_track.as_deref().map(str::trim) {
        Some(legacy) if !legacy.is_empty() => legacy.to_string(),
        _ => DEFAULT_TRACK.to_string(),
    };
    out.academic_track_ids = vec![track];
    Normalized {
        record: out,
        repairs: vec![Repair::AcademicTracks],
    }
}

/// Non-admin users pass through untouched.
pub fn normalize_admin(user: &User, sequencer: &mut AdminCodeSequencer) -> Normalized<User> {
    if !user.is_admin() || !is_blank(user.admin_id.as_deref()) {
        return Normalized::unchanged(user.clone());
    }
    let mut out = user.clone();
    out.admin_id = Some(sequencer.next_code());
    Normalized {
        record: out,
        repairs: vec![Repair::AdminCode],
    }
}

/// Dataset state needed to normalize a single record of any kind.
pub struct NormalizeContext {
    pub course_codes: HashMap<String, String>,
    pub file_codes: BTreeSet<String>,
    pub course_code_set: BTreeSet<String>,
    pub admin_sequencer: AdminCodeSequencer,
    pub now: String,
}

impl NormalizeContext {
    /// Context for a workspace with no stored data.
    pub fn empty() -> Self {
        Self {
            course_codes: HashMap::new(),
            file_codes: BTreeSet::new(),
            course_code_set: BTreeSet::new(),
            admin_sequencer: AdminCodeSequencer::from_existing(std::iter::empty()),
            now: now_stamp(),
        }
    }

    pub fn from_store<S: EntityStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let courses: Vec<Course> = crate::models::decode_all(store.list(Collection::Courses)?)?;
        let files: Vec<FileRecord> = crate::models::decode_all(store.list(Collection::Files)?)?;
        let users: Vec<User> = crate::models::decode_all(store.list(Collection::Users)?)?;

        let course_codes = course_code_index(&courses);
        let course_code_set = courses
            .iter()
            .filter_map(|c| c.course_code.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        let file_codes = files
            .iter()
            .filter_map(|f| f.file_code.clone())
            .filter(|c| !c.trim().is_empty())
            .collect();
        let admin_sequencer = AdminCodeSequencer::from_existing(
            users
                .iter()
                .filter(|u| u.is_admin())
                .filter_map(|u| u.admin_id.as_deref()),
        );

        Ok(Self {
            course_codes,
            file_codes,
            course_code_set,
            admin_sequencer,
            now: now_stamp(),
        })
    }
}

pub fn course_code_index(courses: &[Course]) -> HashMap<String, String> {
    courses
        .iter()
        .filter_map(|c| {
            let id = c.id.as_deref()?.trim();
            let code = c.course_code.as_deref()?.trim();
            if id.is_empty() || code.is_empty() {
                return None;
            }
            Some((id.to_string(), code.to_string()))
        })
        .collect()
}

fn finish<T: Entity>(n: Normalized<T>) -> Result<Normalized<Record>, serde_json::Error> {
    Ok(Normalized {
        record: n.record.into_record()?,
        repairs: n.repairs,
    })
}

/// Normalizes one raw record of `kind` against `ctx`. Kinds without repair
/// rules come back unchanged.
pub fn normalize_record(
    kind: Collection,
    record: Record,
    ctx: &mut NormalizeContext,
) -> Result<Normalized<Record>, serde_json::Error> {
    match kind {
        Collection::Files => {
            let file = FileRecord::from_record(record)?;
            let fctx = FileContext {
                course_codes: &ctx.course_codes,
                existing_codes: &ctx.file_codes,
                now: &ctx.now,
            };
            finish(normalize_file(&file, &fctx))
        }
        Collection::Courses => {
            let course = Course::from_record(record)?;
            finish(normalize_course(&course, &ctx.course_code_set))
        }
        Collection::Lecturers => finish(normalize_lecturer(&Lecturer::from_record(record)?)),
        Collection::Users => {
            let user = User::from_record(record)?;
            finish(normalize_admin(&user, &mut ctx.admin_sequencer))
        }
        Collection::Students | Collection::Messages | Collection::Notifications => {
            Ok(Normalized::unchanged(record))
        }
    }
}
