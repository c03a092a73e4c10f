use crate::models::{decode_all, AcademicTrack, Collection, Entity, Lecturer, Record};
use crate::store::{EntityStore, StoreError};
use crate::tracks::TrackCatalog;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

const HONORIFICS: &[&str] = &["Dr.", "Prof.", "Assoc. Prof."];

const SAMPLE_NAMES: &[(&str, &str)] = &[
    ("Noa", "Levi"),
    ("Yael", "Cohen"),
    ("Daniel", "Mizrahi"),
    ("Maya", "Friedman"),
    ("Omer", "Shapiro"),
    ("Tamar", "Katz"),
    ("Eitan", "Goldberg"),
    ("Shira", "Peretz"),
    ("Amit", "Rosen"),
    ("Lior", "Ben-David"),
];

pub fn find_for_track<'a>(lecturers: &'a [Lecturer], track_id: &str) -> Option<&'a Lecturer> {
    lecturers.iter().find(|l| l.covers_track(track_id))
}

/// Builds a new active lecturer for `track`. Email and employee id carry the
/// full 128-bit UUID of a fresh v4 id.
pub fn synthesize<R: Rng + ?Sized>(track: &AcademicTrack, email_domain: &str, rng: &mut R) -> Lecturer {
    let (first, last) = SAMPLE_NAMES.choose(rng).copied().unwrap_or(("Alex", "Morgan"));
    let honorific = HONORIFICS.choose(rng).copied().unwrap_or("Dr.");
    let tag = Uuid::new_v4().simple().to_string();

    Lecturer {
        id: Some(Uuid::new_v4().to_string()),
        full_name: Some(format!("{honorific} {first} {last}")),
        email: Some(format!(
            "{}.{}.{}@{}",
            first.to_ascii_lowercase(),
            last.to_ascii_lowercase().replace('-', ""),
            tag,
            email_domain
        )),
        employee_id: Some(format!("EMP-{}", tag.to_ascii_uppercase())),
        department: Some(track.department.clone()),
        academic_track_ids: vec![track.id.clone()],
        academic_track: None,
        status: Some("active".to_string()),
        extra: Record::new(),
    }
}

/// Returns a lecturer covering `track_id`, creating and persisting one when
/// none exists. `None` when the track id is not in the catalog; nothing is
/// written in that case.
pub fn ensure_for_track<S: EntityStore + ?Sized>(
    store: &mut S,
    catalog: &TrackCatalog,
    track_id: &str,
    email_domain: &str,
) -> Result<Option<(Lecturer, bool)>, StoreError> {
    let lecturers: Vec<Lecturer> = decode_all(store.list(Collection::Lecturers)?)?;
    if let Some(existing) = find_for_track(&lecturers, track_id) {
        return Ok(Some((existing.clone(), false)));
    }
    let Some(track) = catalog.get(track_id) else {
        return Ok(None);
    };

    let lecturer = synthesize(track, email_domain, &mut rand::thread_rng());
    let stored = store.create(Collection::Lecturers, lecturer.into_record()?)?;
    let lecturer = Lecturer::from_record(stored)?;
    info!(
        track_id,
        lecturer_id = lecturer.id().unwrap_or(""),
        "synthesized lecturer for track"
    );
    Ok(Some((lecturer, true)))
}
