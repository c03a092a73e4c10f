use crate::models::FileType;
use std::collections::{BTreeSet, HashSet};

const FILE_FALLBACK_STEM: &str = "FILE-";
const UNKNOWN_TRACK_RULE: (&str, u64) = ("GEN", 100);

// track id -> (course code prefix, base number)
const COURSE_CODE_RULES: &[(&str, &str, u64)] = &[
    ("cs-undergrad", "CS", 100),
    ("cs-grad", "CS", 500),
    ("swe-undergrad", "SE", 100),
    ("swe-grad", "SE", 500),
    ("math-undergrad", "MATH", 100),
    ("math-grad", "MATH", 500),
    ("physics-undergrad", "PHYS", 100),
    ("law-undergrad", "LAW", 100),
    ("business-undergrad", "BUS", 100),
    ("business-grad", "BUS", 500),
    ("psychology-undergrad", "PSY", 100),
    ("psychology-grad", "PSY", 500),
];

/// What a business code is being generated for.
#[derive(Debug, Clone, Copy)]
pub enum CodeRequest<'a> {
    File {
        course_code: Option<&'a str>,
        file_type: FileType,
    },
    Course {
        track_id: &'a str,
    },
    Admin,
}

/// Returns a code of the requested kind that is not in `existing`.
pub fn generate_code<'a, I>(request: CodeRequest<'_>, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    match request {
        CodeRequest::File {
            course_code,
            file_type,
        } => file_code(course_code, file_type, existing),
        CodeRequest::Course { track_id } => course_code(track_id, existing),
        CodeRequest::Admin => AdminCodeSequencer::from_existing(existing).next_code(),
    }
}

fn trailing_number(code: &str) -> u64 {
    let digits_start = code
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match digits_start {
        Some(i) => code[i..].parse::<u64>().unwrap_or(0),
        None => 0,
    }
}

/// `<COURSE_CODE>-<PREFIX><NNN>`, one past the highest existing sequence for
/// the same course and type. Without a course code the `FILE-NNN` series is
/// used instead.
pub fn file_code<'a, I>(course_code: Option<&str>, file_type: FileType, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let stem = match course_code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(course) => format!("{}-{}", course.to_ascii_uppercase(), file_type.prefix()),
        None => FILE_FALLBACK_STEM.to_string(),
    };
    let highest = existing
        .into_iter()
        .filter(|c| c.starts_with(stem.as_str()))
        .map(trailing_number)
        .max()
        .unwrap_or(0);
    format!("{}{:03}", stem, highest.saturating_add(1))
}

pub fn course_code_rule(track_id: &str) -> Option<(&'static str, u64)> {
    COURSE_CODE_RULES
        .iter()
        .find(|(id, _, _)| *id == track_id)
        .map(|(_, prefix, base)| (*prefix, *base))
}

/// Smallest free `<PREFIX><n>` with `n > base` for the track's rule.
/// Unknown tracks use the `GEN` series, whose first code is `GEN101`.
pub fn course_code<'a, I>(track_id: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let (prefix, base) = course_code_rule(track_id).unwrap_or(UNKNOWN_TRACK_RULE);
    let used: HashSet<u64> = existing
        .into_iter()
        .filter_map(|c| c.trim().strip_prefix(prefix))
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|rest| rest.parse::<u64>().ok())
        .filter(|n| *n >= base)
        .collect();

    let mut candidate = base + 1;
    while used.contains(&candidate) {
        candidate += 1;
    }
    format!("{prefix}{candidate}")
}

const ADMIN_CODE_MAX: u64 = 9999;

/// Hands out `ADM####` codes for one batch of admins, continuing after the
/// highest code already present in that batch. Suffixes that do not fit in
/// four digits are ignored; once the sequence passes `ADM9999` it wraps to
/// the smallest free number.
#[derive(Debug, Clone)]
pub struct AdminCodeSequencer {
    next: u64,
    used: BTreeSet<u64>,
}

impl AdminCodeSequencer {
    pub fn from_existing<'a, I>(existing: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let used: BTreeSet<u64> = existing
            .into_iter()
            .filter_map(|c| c.trim().strip_prefix("ADM"))
            .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|rest| rest.parse::<u64>().ok())
            .filter(|n| (1..=ADMIN_CODE_MAX).contains(n))
            .collect();
        let next = used.last().map_or(1, |n| n + 1);
        Self { next, used }
    }

    pub fn next_code(&mut self) -> String {
        let mut n = if self.next > ADMIN_CODE_MAX { 1 } else { self.next };
        while n <= ADMIN_CODE_MAX && self.used.contains(&n) {
            n += 1;
        }
        // All four-digit codes are taken.
        if n > ADMIN_CODE_MAX {
            n = ADMIN_CODE_MAX + 1;
        }
        self.used.insert(n);
        self.next = n.saturating_add(1);
        format!("ADM{n:04}")
    }
}
