use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Entity families the platform persists. Each kind maps to one directory
/// under `<workspace>/data/` holding one pretty-printed JSON object per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Rooms,
    Courses,
    Users,
    Assignments,
    Grades,
    Feedback,
    Requests,
}

impl DocKind {
    pub const ALL: [DocKind; 7] = [
        DocKind::Rooms,
        DocKind::Courses,
        DocKind::Users,
        DocKind::Assignments,
        DocKind::Grades,
        DocKind::Feedback,
        DocKind::Requests,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            DocKind::Rooms => "rooms",
            DocKind::Courses => "courses",
            DocKind::Users => "users",
            DocKind::Assignments => "assignments",
            DocKind::Grades => "grades",
            DocKind::Feedback => "feedback",
            DocKind::Requests => "requests",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "instructor" => Some(Role::Instructor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

// Document naming convention. Every entity is addressed by the composite key
// embedded in its file name.
pub fn room_doc(college_room: &str, room_number: &str) -> String {
    format!("{}_{}_room.json", college_room, room_number)
}

pub fn course_doc(course_code: &str) -> String {
    format!("{}_course.json", course_code)
}

pub fn profile_doc(user_id: &str, role: Role) -> String {
    format!("{}_{}_profile.json", user_id, role.as_str())
}

pub fn assignment_doc(assignment_code: &str) -> String {
    format!("{}_assignment.json", assignment_code)
}

pub fn assigned_doc(assignment_code: &str) -> String {
    format!("{}_assigned.json", assignment_code)
}

pub fn submission_doc(student_id: &str) -> String {
    format!("{}_assignment_submission.json", student_id)
}

pub fn grade_doc(student_id: &str) -> String {
    format!("{}_grade.json", student_id)
}

pub fn feedback_doc(instructor_id: &str) -> String {
    format!("{}_feedback.json", instructor_id)
}

pub fn requests_doc(student_id: &str) -> String {
    format!("{}_course_requests.json", student_id)
}

pub const SUFFIX_ROOM: &str = "_room.json";
pub const SUFFIX_COURSE: &str = "_course.json";
pub const SUFFIX_STUDENT_PROFILE: &str = "_student_profile.json";
pub const SUFFIX_INSTRUCTOR_PROFILE: &str = "_instructor_profile.json";
pub const SUFFIX_ADMIN_PROFILE: &str = "_admin_profile.json";
pub const SUFFIX_PROFILE: &str = "_profile.json";
pub const SUFFIX_ASSIGNMENT: &str = "_assignment.json";
pub const SUFFIX_ASSIGNED: &str = "_assigned.json";
pub const SUFFIX_SUBMISSION: &str = "_assignment_submission.json";
pub const SUFFIX_REQUESTS: &str = "_course_requests.json";

/// Flat-file document store rooted at `<workspace>/data`. All reads and
/// writes go through here; writes serialize the full value first, then
/// replace the file via a temp name so a crash never leaves a torn document.
pub struct Store {
    data_dir: PathBuf,
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Store> {
        let data_dir = workspace.join("data");
        for kind in DocKind::ALL {
            let dir = data_dir.join(kind.dir_name());
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.to_string_lossy()))?;
        }
        Ok(Store { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn doc_path(&self, kind: DocKind, name: &str) -> PathBuf {
        self.data_dir.join(kind.dir_name()).join(name)
    }

    pub fn exists(&self, kind: DocKind, name: &str) -> bool {
        self.doc_path(kind, name).is_file()
    }

    /// Missing documents are `None`; an unreadable or unparsable document is
    /// an error (surfaced as `corrupt` at the IPC boundary, never repaired).
    pub fn read<T: DeserializeOwned>(&self, kind: DocKind, name: &str) -> anyhow::Result<Option<T>> {
        let path = self.doc_path(kind, name);
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow!(e)).with_context(|| format!("failed to read document {}", name))
            }
        };
        let value = serde_json::from_str(&text)
            .with_context(|| format!("document {} is not valid JSON", name))?;
        Ok(Some(value))
    }

    pub fn write<T: Serialize>(&self, kind: DocKind, name: &str, value: &T) -> anyhow::Result<()> {
        let path = self.doc_path(kind, name);
        let text = serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialize document {}", name))?;
        let tmp = path.with_extension("json.writing");
        std::fs::write(&tmp, text)
            .with_context(|| format!("failed to write document {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace document {}", name))?;
        Ok(())
    }

    pub fn remove(&self, kind: DocKind, name: &str) -> anyhow::Result<bool> {
        let path = self.doc_path(kind, name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow!(e)).with_context(|| format!("failed to remove document {}", name)),
        }
    }

    /// Sorted file names of a kind ending with `suffix`. Totals in the UI are
    /// derived from these listings, never from in-memory counters.
    pub fn list(&self, kind: DocKind, suffix: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.data_dir.join(kind.dir_name());
        let mut names = Vec::new();
        for ent in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to list {}", dir.to_string_lossy()))?
        {
            let ent = ent?;
            if !ent.path().is_file() {
                continue;
            }
            let Some(name) = ent.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            if name.ends_with(suffix) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
