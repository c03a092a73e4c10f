use crate::codes;
use crate::models::{Collection, FileType, Record};
use crate::normalize::now_stamp;
use crate::tracks::TrackCatalog;
use serde_json::{json, Value};

/// Source of the dataset written by a full refresh.
pub trait SeedProvider {
    fn generate(&mut self, catalog: &TrackCatalog) -> Vec<(Collection, Vec<Record>)>;
}

const LECTURER_NAMES: &[(&str, &str)] = &[
    ("Noa", "Levi"),
    ("Yael", "Cohen"),
    ("Daniel", "Mizrahi"),
    ("Maya", "Friedman"),
    ("Omer", "Shapiro"),
    ("Tamar", "Katz"),
];

const STUDENT_NAMES: &[&str] = &[
    "Adi Barak",
    "Ron Avraham",
    "Michal Dahan",
    "Itai Golan",
    "Hila Sasson",
    "Yonatan Erez",
];

const COURSE_LEVELS: &[(&str, i64)] = &[("Foundations", 4), ("Advanced Topics", 3)];

/// Small synthetic dataset that already satisfies every reconciliation
/// invariant.
pub struct SampleDataset {
    pub email_domain: String,
}

fn obj(v: Value) -> Record {
    match v {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

impl SeedProvider for SampleDataset {
    fn generate(&mut self, catalog: &TrackCatalog) -> Vec<(Collection, Vec<Record>)> {
        let now = now_stamp();
        let domain = self.email_domain.as_str();

        let users = vec![obj(json!({
            "id": "admin-1",
            "full_name": "System Administrator",
            "email": format!("admin@{domain}"),
            "role": "admin",
            "admin_id": "ADM0001",
        }))];

        let mut lecturers = Vec::new();
        for (i, track) in catalog.all().iter().enumerate() {
            let (first, last) = LECTURER_NAMES[i % LECTURER_NAMES.len()];
            lecturers.push(obj(json!({
                "id": format!("lecturer-{}", track.id),
                "full_name": format!("Dr. {first} {last}"),
                "email": format!("{}.{}.{}@{domain}", first.to_ascii_lowercase(), last.to_ascii_lowercase(), i + 1),
                "employee_id": format!("EMP-{:04}", 1001 + i),
                "department": track.department,
                "academic_track_ids": [track.id],
                "status": "active",
            })));
        }

        let students: Vec<Record> = STUDENT_NAMES
            .iter()
            .enumerate()
            .map(|(i, name)| {
                obj(json!({
                    "id": format!("student-{}", i + 1),
                    "full_name": name,
                    "national_id": format!("{:09}", 200_000_001 + i),
                    "email": format!("student{}@{domain}", i + 1),
                }))
            })
            .collect();

        let mut courses = Vec::new();
        let mut course_codes: Vec<String> = Vec::new();
        let mut course_rows: Vec<(String, String)> = Vec::new();
        for track in catalog.all().iter().filter(|t| t.id.ends_with("-undergrad")) {
            for (level, credits) in COURSE_LEVELS {
                let code = codes::course_code(&track.id, course_codes.iter().map(String::as_str));
                course_codes.push(code.clone());
                let id = format!("course-{}", code.to_ascii_lowercase());
                courses.push(obj(json!({
                    "id": id,
                    "course_name": format!("{} {}", track.department, level),
                    "course_code": code,
                    "academic_track_ids": [track.id],
                    "lecturer_ids": [format!("lecturer-{}", track.id)],
                    "credits": credits,
                })));
                course_rows.push((id, code));
            }
        }

        let mut files = Vec::new();
        let mut file_codes: Vec<String> = Vec::new();
        for (n, (course_id, course_code)) in course_rows.iter().enumerate() {
            let lecturer_id = courses[n]
                .get("lecturer_ids")
                .and_then(|v| v.get(0))
                .cloned()
                .unwrap_or(Value::Null);
            let student_id = format!("student-{}", n % STUDENT_NAMES.len() + 1);
            let uploads = [
                (FileType::Note, "Lecture notes", lecturer_id.clone(), "lecturer", "approved"),
                (FileType::Exam, "Past exam", Value::String(student_id), "student", "pending"),
            ];
            for (file_type, title, uploader, role, status) in uploads {
                let code = codes::file_code(
                    Some(course_code),
                    file_type,
                    file_codes.iter().map(String::as_str),
                );
                file_codes.push(code.clone());
                files.push(obj(json!({
                    "id": format!("file-{}", code.to_ascii_lowercase()),
                    "original_name": format!("{course_code} {title}"),
                    "course_id": course_id,
                    "uploader_id": uploader,
                    "uploader_type": role,
                    "status": status,
                    "file_code": code,
                    "file_type": file_type.as_str(),
                    "download_count": 0,
                    "created_at": now,
                    "updated_at": now,
                })));
            }
        }

        let messages = vec![obj(json!({
            "id": "message-1",
            "subject": "Welcome to the course library",
            "content": "Upload your notes and past exams to share them with your classmates.",
            "sender_id": "admin-1",
            "created_at": now,
        }))];

        let notifications: Vec<Record> = students
            .iter()
            .filter_map(|s| s.get("id").cloned())
            .enumerate()
            .map(|(i, user_id)| {
                obj(json!({
                    "id": format!("notification-{}", i + 1),
                    "message": "New materials were added to your courses.",
                    "user_id": user_id,
                    "read": false,
                    "created_at": now,
                }))
            })
            .collect();

        vec![
            (Collection::Users, users),
            (Collection::Lecturers, lecturers),
            (Collection::Students, students),
            (Collection::Courses, courses),
            (Collection::Files, files),
            (Collection::Messages, messages),
            (Collection::Notifications, notifications),
        ]
    }
}
