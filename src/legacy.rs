use crate::models::{Collection, Record};
use serde_json::Value;

// (legacy field, canonical field) per collection. The first legacy field
// with a non-blank value wins.
const COURSE_FIELDS: &[(&str, &str)] = &[("name", "course_name"), ("code", "course_code")];
const FILE_FIELDS: &[(&str, &str)] = &[
    ("filename", "original_name"),
    ("title", "original_name"),
    ("type", "file_type"),
];
const PERSON_FIELDS: &[(&str, &str)] = &[("name", "full_name")];
const MESSAGE_FIELDS: &[(&str, &str)] = &[("sender", "sender_id")];

fn field_map(kind: Collection) -> &'static [(&'static str, &'static str)] {
    match kind {
        Collection::Courses => COURSE_FIELDS,
        Collection::Files => FILE_FIELDS,
        Collection::Lecturers | Collection::Users | Collection::Students => PERSON_FIELDS,
        Collection::Messages => MESSAGE_FIELDS,
        Collection::Notifications => &[],
    }
}

fn is_blank_value(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Rewrites older field names to the canonical ones for `kind`.
///
/// A canonical field that already carries a value is left alone and the
/// legacy field is kept next to it; otherwise the legacy value moves over.
/// The legacy single-track `academic_track` field is never touched here, the
/// normalizer reads it as a fallback.
pub fn canonicalize(kind: Collection, mut record: Record) -> Record {
    for (legacy, canonical) in field_map(kind) {
        if !is_blank_value(record.get(*canonical)) {
            continue;
        }
        if is_blank_value(record.get(*legacy)) {
            continue;
        }
        if let Some(v) = record.remove(*legacy) {
            record.insert((*canonical).to_string(), v);
        }
    }
    record
}
