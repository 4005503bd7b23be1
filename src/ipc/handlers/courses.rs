use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::enrollment;
use super::rooms::{self, SlotReservation};
use super::users;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_i64, get_required_str, list_docs, read_doc, remove_doc, store_of, write_doc,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{
    self, DocKind, Role, Store, SUFFIX_COURSE, SUFFIX_INSTRUCTOR_PROFILE, SUFFIX_STUDENT_PROFILE,
};
use crate::timetable;

const MIN_CREDITED_UNITS: i64 = 2;
const MAX_CREDITED_UNITS: i64 = 6;

pub const UNASSIGNED_INSTRUCTOR: &str = "To be Assigned";

/// Course document. Placement (room + day + times) is embedded by value; the
/// matching slot must have been reserved in the room document before this is
/// ever written.
#[derive(Debug, Serialize, Deserialize)]
pub struct Course {
    pub course_code: String,
    pub course_name: String,
    pub credited_units: i64,
    pub assigned_college_room: String,
    pub room_number: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub instructor_id: Option<String>,
    /// Instructor display name snapshot, stored under `name` on disk.
    #[serde(default, rename = "name")]
    pub instructor_name: Option<String>,
    #[serde(default)]
    pub enrolled_students: Vec<StudentRef>,
}

/// Roster entry: a snapshot of the student's attributes at enrollment time,
/// not a live reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRef {
    pub student_id: String,
    pub username: String,
    pub student_email: String,
    pub student_major: String,
    pub student_year_level: String,
    pub student_semester: String,
    pub academic_year: String,
}

pub fn read_course(store: &Store, course_code: &str) -> Result<Option<Course>, HandlerErr> {
    read_doc(store, DocKind::Courses, &store::course_doc(course_code))
}

pub fn write_course(store: &Store, course: &Course) -> Result<(), HandlerErr> {
    write_doc(
        store,
        DocKind::Courses,
        &store::course_doc(&course.course_code),
        course,
    )
}

fn courses_add(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let course_code = get_required_str(params, "courseCode")?;
    let course_name = get_required_str(params, "courseName")?;
    let credited_units = get_required_i64(params, "creditedUnits")?;
    let college_room = get_required_str(params, "collegeRoom")?.to_uppercase();
    let room_number = get_required_str(params, "roomNumber")?;
    let day = get_required_str(params, "day")?;
    let start_time = get_required_str(params, "startTime")?;
    let end_time = get_required_str(params, "endTime")?;

    if !(MIN_CREDITED_UNITS..=MAX_CREDITED_UNITS).contains(&credited_units) {
        return Err(HandlerErr::new(
            "validation",
            format!(
                "credited units must be between {} and {}",
                MIN_CREDITED_UNITS, MAX_CREDITED_UNITS
            ),
        ));
    }

    // Strict create: refuse to overwrite an existing course, and refuse it
    // before reserving the slot so nothing leaks on failure.
    if store.exists(DocKind::Courses, &store::course_doc(&course_code)) {
        return Err(HandlerErr::new(
            "already_exists",
            format!("course {} already exists", course_code),
        ));
    }

    match rooms::check_and_reserve_slot(
        store,
        &college_room,
        &room_number,
        &day,
        &start_time,
        &end_time,
    )? {
        SlotReservation::NotRegistered => {
            return Err(HandlerErr::new(
                "room_not_registered",
                format!("room {} {} is not registered", college_room, room_number),
            ));
        }
        SlotReservation::Conflict(slot) => {
            return Err(HandlerErr::with_details(
                "schedule_conflict",
                format!(
                    "time conflict in room {} {} on {}",
                    college_room, room_number, day
                ),
                json!({
                    "day": slot.day,
                    "startTime": slot.start_time,
                    "endTime": slot.end_time,
                }),
            ));
        }
        SlotReservation::Reserved => {}
    }

    // Reserve-then-persist: the slot stays reserved even if this write fails.
    let course = Course {
        course_code: course_code.clone(),
        course_name,
        credited_units,
        assigned_college_room: college_room,
        room_number,
        day,
        start_time,
        end_time,
        instructor_id: None,
        instructor_name: None,
        enrolled_students: Vec::new(),
    };
    write_course(store, &course)?;

    Ok(json!({ "courseCode": course_code, "creditedUnits": credited_units }))
}

/// Snapshot of a course embedded into an instructor profile on assignment.
fn instructor_course_entry(course: &Course) -> serde_json::Value {
    json!({
        "course_code": course.course_code,
        "course_name": course.course_name,
        "credited_units": course.credited_units,
        "assigned_college_room": course.assigned_college_room,
        "room_number": course.room_number,
        "day": course.day,
        "start_time": course.start_time,
        "end_time": course.end_time,
    })
}

fn courses_assign_instructor(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let course_code = get_required_str(params, "courseCode")?;
    let instructor_id = get_required_str(params, "instructorId")?;

    let Some(mut course) = read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course {} does not exist", course_code),
        ));
    };
    let Some(mut profile) = users::read_profile(store, &instructor_id, Role::Instructor)? else {
        return Err(HandlerErr::new(
            "instructor_not_found",
            format!("no profile found for instructor {}", instructor_id),
        ));
    };

    // Idempotency guard keyed by course code, checked before either document
    // is touched.
    let already = profile
        .get("assigned_courses")
        .and_then(|v| v.as_array())
        .map(|courses| {
            courses
                .iter()
                .any(|c| c.get("course_code").and_then(|v| v.as_str()) == Some(&course_code))
        })
        .unwrap_or(false);
    if already {
        return Err(HandlerErr::new(
            "already_assigned",
            format!(
                "course {} is already assigned to instructor {}",
                course_code, instructor_id
            ),
        ));
    }

    let instructor_name = profile
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("N/A")
        .to_string();

    course.instructor_id = Some(instructor_id.clone());
    course.instructor_name = Some(instructor_name.clone());
    write_course(store, &course)?;

    let entry = instructor_course_entry(&course);
    match profile.get_mut("assigned_courses").and_then(|v| v.as_array_mut()) {
        Some(assigned) => assigned.push(entry),
        None => profile["assigned_courses"] = json!([entry]),
    }
    users::write_profile(store, &instructor_id, Role::Instructor, &profile)?;

    Ok(json!({
        "courseCode": course_code,
        "instructorId": instructor_id,
        "instructorName": instructor_name,
    }))
}

fn courses_remove(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let course_code = get_required_str(params, "courseCode")?;

    let doc_name = store::course_doc(&course_code);
    if !store.exists(DocKind::Courses, &doc_name) {
        return Err(HandlerErr::new(
            "not_found",
            format!("course {} not found", course_code),
        ));
    }

    // Scrub the course from every instructor profile that lists it. Student
    // profiles are intentionally left alone (see DESIGN.md).
    let mut instructors_updated = 0usize;
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_INSTRUCTOR_PROFILE)? {
        let Ok(Some(mut profile)) =
            store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        let Some(assigned) = profile
            .get_mut("assigned_courses")
            .and_then(|v| v.as_array_mut())
        else {
            continue;
        };
        let before = assigned.len();
        assigned.retain(|c| c.get("course_code").and_then(|v| v.as_str()) != Some(&course_code));
        if assigned.len() != before {
            write_doc(store, DocKind::Users, &profile_name, &profile)?;
            instructors_updated += 1;
        }
    }

    remove_doc(store, DocKind::Courses, &doc_name)?;

    Ok(json!({ "removed": true, "instructorsUpdated": instructors_updated }))
}

/// Instructor id -> display name, for joining listings.
fn instructor_names(store: &Store) -> Result<HashMap<String, String>, HandlerErr> {
    let mut names = HashMap::new();
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_INSTRUCTOR_PROFILE)? {
        let Ok(Some(profile)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        if let (Some(id), Some(name)) = (
            profile.get("user_id").and_then(|v| v.as_str()),
            profile.get("name").and_then(|v| v.as_str()),
        ) {
            names.insert(id.to_string(), name.to_string());
        }
    }
    Ok(names)
}

fn course_summary(course: &Course, instructor_name: &str) -> serde_json::Value {
    json!({
        "courseCode": course.course_code,
        "courseName": course.course_name,
        "creditedUnits": course.credited_units,
        "collegeRoom": course.assigned_college_room,
        "roomNumber": course.room_number,
        "day": course.day,
        "startTime": course.start_time,
        "endTime": course.end_time,
        "instructorId": course.instructor_id,
        "instructorName": instructor_name,
        "enrolledCount": course.enrolled_students.len(),
    })
}

fn courses_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let names = instructor_names(store)?;

    let mut courses = Vec::new();
    for course_name in list_docs(store, DocKind::Courses, SUFFIX_COURSE)? {
        let Ok(Some(course)) = store.read::<Course>(DocKind::Courses, &course_name) else {
            continue;
        };
        let resolved = course
            .instructor_name
            .clone()
            .or_else(|| {
                course
                    .instructor_id
                    .as_ref()
                    .and_then(|id| names.get(id).cloned())
            })
            .unwrap_or_else(|| UNASSIGNED_INSTRUCTOR.to_string());
        courses.push(course_summary(&course, &resolved));
    }
    Ok(json!({ "courses": courses }))
}

/// Soft count: a missing or unreadable course document counts as zero.
fn enrolled_count_soft(store: &Store, course_code: &str) -> (usize, bool) {
    match store.read::<Course>(DocKind::Courses, &store::course_doc(course_code)) {
        Ok(Some(course)) => (course.enrolled_students.len(), false),
        _ => (0, true),
    }
}

fn courses_enrolled_count(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let course_code = get_required_str(params, "courseCode")?;
    let (count, missing) = enrolled_count_soft(store, &course_code);
    Ok(json!({ "count": count, "missing": missing }))
}

fn courses_for_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;

    let Some(profile) = users::read_profile(store, &student_id, Role::Student)? else {
        return Err(HandlerErr::new(
            "student_not_found",
            format!("no profile found for student {}", student_id),
        ));
    };

    let refs: Vec<serde_json::Value> = profile
        .get("courses")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let mut entries = Vec::new();
    for course_ref in &refs {
        let Some(code) = course_ref.get("course_code").and_then(|v| v.as_str()) else {
            continue;
        };
        // Resolve against the live course document; snapshots whose course
        // has since been removed are skipped here.
        let Ok(Some(course)) = store.read::<Course>(DocKind::Courses, &store::course_doc(code))
        else {
            continue;
        };
        let resolved = course
            .instructor_name
            .clone()
            .unwrap_or_else(|| UNASSIGNED_INSTRUCTOR.to_string());
        entries.push(course_summary(&course, &resolved));
    }
    entries.sort_by_key(|c| {
        timetable::timetable_sort_key(
            c.get("day").and_then(|v| v.as_str()).unwrap_or(""),
            c.get("startTime").and_then(|v| v.as_str()).unwrap_or("23:59"),
        )
    });

    // Refs whose course no longer resolves are reported but not listed.
    let total = entries.len();
    let dangling = refs.len() - total;
    Ok(json!({ "courses": entries, "total": total, "dangling": dangling }))
}

fn courses_for_instructor(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let instructor_id = get_required_str(params, "instructorId")?;

    let Some(profile) = users::read_profile(store, &instructor_id, Role::Instructor)? else {
        return Err(HandlerErr::new(
            "instructor_not_found",
            format!("no profile found for instructor {}", instructor_id),
        ));
    };

    let mut assigned: Vec<serde_json::Value> = profile
        .get("assigned_courses")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assigned.sort_by_key(|c| {
        timetable::timetable_sort_key(
            c.get("day").and_then(|v| v.as_str()).unwrap_or(""),
            c.get("start_time").and_then(|v| v.as_str()).unwrap_or("23:59"),
        )
    });

    let entries: Vec<serde_json::Value> = assigned
        .iter()
        .map(|c| {
            let code = c.get("course_code").and_then(|v| v.as_str()).unwrap_or("");
            let (count, _) = enrolled_count_soft(store, code);
            json!({
                "courseCode": code,
                "courseName": c.get("course_name"),
                "creditedUnits": c.get("credited_units"),
                "collegeRoom": c.get("assigned_college_room"),
                "roomNumber": c.get("room_number"),
                "day": c.get("day"),
                "startTime": c.get("start_time"),
                "endTime": c.get("end_time"),
                "enrolledCount": count,
            })
        })
        .collect();

    let total = entries.len();
    Ok(json!({ "courses": entries, "total": total }))
}

/// Instructor's class-list view: who is sitting in one of their courses.
/// Enrollment is read from the student-profile side, which is authoritative.
fn courses_students(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let instructor_id = get_required_str(params, "instructorId")?;
    let course_code = get_required_str(params, "courseCode")?;

    let Some(profile) = users::read_profile(store, &instructor_id, Role::Instructor)? else {
        return Err(HandlerErr::new(
            "instructor_not_found",
            format!("no profile found for instructor {}", instructor_id),
        ));
    };
    let assigned = profile
        .get("assigned_courses")
        .and_then(|v| v.as_array())
        .map(|courses| {
            courses
                .iter()
                .any(|c| c.get("course_code").and_then(|v| v.as_str()) == Some(&course_code))
        })
        .unwrap_or(false);
    if !assigned {
        return Err(HandlerErr::new(
            "not_assigned",
            format!(
                "course {} is not assigned to instructor {}",
                course_code, instructor_id
            ),
        ));
    }

    let mut students = Vec::new();
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_STUDENT_PROFILE)? {
        let Ok(Some(student)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        if !enrollment::profile_lists_course(&student, &course_code) {
            continue;
        }
        students.push(json!({
            "studentId": student.get("user_id"),
            "name": student.get("name"),
            "email": student.get("email"),
            "major": student.get("major"),
            "yearLevel": student.get("year_level"),
            "semester": student.get("semester"),
        }));
    }
    let total = students.len();

    Ok(json!({ "courseCode": course_code, "students": students, "total": total }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "courses.add" => courses_add(state, &req.params),
        "courses.assignInstructor" => courses_assign_instructor(state, &req.params),
        "courses.remove" => courses_remove(state, &req.params),
        "courses.list" => courses_list(state),
        "courses.enrolledCount" => courses_enrolled_count(state, &req.params),
        "courses.forStudent" => courses_for_student(state, &req.params),
        "courses.forInstructor" => courses_for_instructor(state, &req.params),
        "courses.students" => courses_students(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
