use serde_json::json;

use super::courses::{self, Course, StudentRef};
use super::users;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_bool, get_required_str, list_docs, read_doc, store_of, write_doc, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, DocKind, Role, Store, SUFFIX_REQUESTS, SUFFIX_STUDENT_PROFILE};

fn profile_str(profile: &serde_json::Value, key: &str) -> String {
    profile
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("N/A")
        .to_string()
}

/// The student's embedded course list is the authoritative side of the
/// enrollment relation.
pub fn profile_lists_course(profile: &serde_json::Value, course_code: &str) -> bool {
    profile
        .get("courses")
        .and_then(|v| v.as_array())
        .map(|courses| {
            courses
                .iter()
                .any(|c| c.get("course_code").and_then(|v| v.as_str()) == Some(course_code))
        })
        .unwrap_or(false)
}

/// Snapshot of a course embedded into a student profile at enrollment time.
fn course_ref_entry(course: &Course) -> serde_json::Value {
    json!({
        "course_code": course.course_code,
        "course_name": course.course_name,
        "credited_units": course.credited_units,
        "college_room": course.assigned_college_room,
        "room_number": course.room_number,
        "day": course.day,
        "start_time": course.start_time,
        "end_time": course.end_time,
        "instructor_id": course.instructor_id,
    })
}

fn student_ref_from_profile(student_id: &str, profile: &serde_json::Value) -> StudentRef {
    StudentRef {
        student_id: student_id.to_string(),
        username: profile_str(profile, "name"),
        student_email: profile_str(profile, "email"),
        student_major: profile_str(profile, "major"),
        student_year_level: profile_str(profile, "year_level"),
        student_semester: profile_str(profile, "semester"),
        academic_year: profile_str(profile, "academic_year"),
    }
}

/// Enroll one student into a course: append the snapshot pair and persist
/// both documents, student side first. The two writes are sequential and
/// best-effort; there is no cross-file transaction.
fn enroll_one(
    store: &Store,
    student_id: &str,
    profile: &mut serde_json::Value,
    course: &mut Course,
) -> Result<(), HandlerErr> {
    if profile_lists_course(profile, &course.course_code) {
        return Err(HandlerErr::new(
            "already_enrolled",
            format!(
                "student {} is already enrolled in course {}",
                student_id, course.course_code
            ),
        ));
    }

    // A stale roster entry (edited out-of-band) is replaced rather than
    // duplicated, keeping exactly one reference per side.
    course
        .enrolled_students
        .retain(|s| s.student_id != student_id);
    course
        .enrolled_students
        .push(student_ref_from_profile(student_id, profile));

    let entry = course_ref_entry(course);
    match profile.get_mut("courses").and_then(|v| v.as_array_mut()) {
        Some(list) => list.push(entry),
        None => profile["courses"] = json!([entry]),
    }

    users::write_profile(store, student_id, Role::Student, profile)?;
    courses::write_course(store, course)?;
    Ok(())
}

fn enrollment_is_enrolled(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let course_code = get_required_str(params, "courseCode")?;

    let enrolled = match users::read_profile(store, &student_id, Role::Student)? {
        Some(profile) => profile_lists_course(&profile, &course_code),
        None => false,
    };
    Ok(json!({ "enrolled": enrolled }))
}

fn enrollment_enroll(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let course_code = get_required_str(params, "courseCode")?;

    let Some(mut profile) = users::read_profile(store, &student_id, Role::Student)? else {
        return Err(HandlerErr::new(
            "student_not_found",
            format!("student with id {} was not found", student_id),
        ));
    };
    let Some(mut course) = courses::read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course with code {} was not found", course_code),
        ));
    };

    enroll_one(store, &student_id, &mut profile, &mut course)?;
    Ok(json!({ "studentId": student_id, "courseCode": course_code }))
}

fn enrollment_enroll_batch(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let program = get_required_str(params, "program")?;
    let year_level = get_required_str(params, "yearLevel")?;
    let semester = get_required_str(params, "semester")?;
    let course_code = get_required_str(params, "courseCode")?;

    let Some(mut course) = courses::read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course with code {} was not found", course_code),
        ));
    };

    let mut enrolled = 0usize;
    let mut skipped = 0usize;
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_STUDENT_PROFILE)? {
        let Ok(Some(mut profile)) =
            store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        // Section match is exact and case-sensitive.
        let matches = profile.get("major").and_then(|v| v.as_str()) == Some(program.as_str())
            && profile.get("year_level").and_then(|v| v.as_str()) == Some(year_level.as_str())
            && profile.get("semester").and_then(|v| v.as_str()) == Some(semester.as_str());
        if !matches {
            continue;
        }
        let Some(student_id) = profile
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
        else {
            continue;
        };
        // Individual failures do not stop the batch.
        match enroll_one(store, &student_id, &mut profile, &mut course) {
            Ok(()) => enrolled += 1,
            Err(_) => skipped += 1,
        }
    }

    Ok(json!({ "courseCode": course_code, "enrolled": enrolled, "skipped": skipped }))
}

fn enrollment_drop(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let course_code = get_required_str(params, "courseCode")?;
    if !get_bool(params, "confirm") {
        return Err(HandlerErr::new(
            "not_confirmed",
            format!("dropping of course {} was not confirmed", course_code),
        ));
    }

    let Some(mut profile) = users::read_profile(store, &student_id, Role::Student)? else {
        return Err(HandlerErr::new(
            "student_not_found",
            format!("student with id {} was not found", student_id),
        ));
    };
    if !profile_lists_course(&profile, &course_code) {
        return Err(HandlerErr::new(
            "not_enrolled",
            format!(
                "student {} is not enrolled in course {}",
                student_id, course_code
            ),
        ));
    }

    if let Some(list) = profile.get_mut("courses").and_then(|v| v.as_array_mut()) {
        list.retain(|c| c.get("course_code").and_then(|v| v.as_str()) != Some(&course_code));
    }
    users::write_profile(store, &student_id, Role::Student, &profile)?;

    // The course document may already be gone; the profile-side removal
    // stands either way.
    let course_updated = match courses::read_course(store, &course_code)? {
        Some(mut course) => {
            course
                .enrolled_students
                .retain(|s| s.student_id != student_id);
            courses::write_course(store, &course)?;
            true
        }
        None => false,
    };

    Ok(json!({ "dropped": true, "courseUpdated": course_updated }))
}

fn enrollment_request(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let course_code = get_required_str(params, "courseCode")?;

    let Some(profile) = users::read_profile(store, &student_id, Role::Student)? else {
        return Err(HandlerErr::new(
            "student_not_found",
            format!("student with id {} was not found", student_id),
        ));
    };
    let Some(course) = courses::read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course with code {} was not found", course_code),
        ));
    };
    if profile_lists_course(&profile, &course_code) {
        return Err(HandlerErr::new(
            "already_enrolled",
            format!("student {} is already enrolled in {}", student_id, course_code),
        ));
    }

    let doc_name = store::requests_doc(&student_id);
    let mut requests: serde_json::Value = read_doc(store, DocKind::Requests, &doc_name)?
        .unwrap_or_else(|| {
            json!({
                "student_id": student_id,
                "name": profile.get("name"),
                "major": profile.get("major"),
                "year_level": profile.get("year_level"),
                "semester": profile.get("semester"),
                "course_requests": [],
            })
        });

    let already = requests
        .get("course_requests")
        .and_then(|v| v.as_array())
        .map(|list| {
            list.iter()
                .any(|r| r.get("course_code").and_then(|v| v.as_str()) == Some(&course_code))
        })
        .unwrap_or(false);
    if already {
        return Err(HandlerErr::new(
            "already_requested",
            format!("course {} is already in the requested list", course_code),
        ));
    }

    let entry = json!({
        "course_code": course.course_code,
        "course_name": course.course_name,
        "credits": course.credited_units,
    });
    match requests
        .get_mut("course_requests")
        .and_then(|v| v.as_array_mut())
    {
        Some(list) => list.push(entry),
        None => requests["course_requests"] = json!([entry]),
    }
    write_doc(store, DocKind::Requests, &doc_name, &requests)?;

    Ok(json!({ "studentId": student_id, "courseCode": course_code }))
}

fn enrollment_list_requests(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let mut entries = Vec::new();
    for doc_name in list_docs(store, DocKind::Requests, SUFFIX_REQUESTS)? {
        let Ok(Some(requests)) = store.read::<serde_json::Value>(DocKind::Requests, &doc_name)
        else {
            continue;
        };
        let codes: Vec<serde_json::Value> = requests
            .get("course_requests")
            .and_then(|v| v.as_array())
            .map(|list| list.iter().filter_map(|r| r.get("course_code").cloned()).collect())
            .unwrap_or_default();
        entries.push(json!({
            "studentId": requests.get("student_id"),
            "name": requests.get("name"),
            "major": requests.get("major"),
            "yearLevel": requests.get("year_level"),
            "semester": requests.get("semester"),
            "courseRequests": codes,
        }));
    }
    Ok(json!({ "requests": entries }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "enrollment.isEnrolled" => enrollment_is_enrolled(state, &req.params),
        "enrollment.enroll" => enrollment_enroll(state, &req.params),
        "enrollment.enrollBatch" => enrollment_enroll_batch(state, &req.params),
        "enrollment.drop" => enrollment_drop(state, &req.params),
        "enrollment.request" => enrollment_request(state, &req.params),
        "enrollment.listRequests" => enrollment_list_requests(state),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
