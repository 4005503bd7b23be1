use serde::{Deserialize, Serialize};
use serde_json::json;

use super::courses;
use crate::grading;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, list_docs, read_doc, store_of,
    write_doc, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, DocKind, Store, SUFFIX_ASSIGNED, SUFFIX_ASSIGNMENT, SUFFIX_SUBMISSION};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub assignment_code: String,
    pub assignment_name: String,
    pub details: String,
    pub points: i64,
    pub deadline_date: String,
    pub deadline_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssignedStudent {
    pub student_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_status: Option<String>,
}

/// Tracking document: the roster snapshot taken when an assignment is
/// distributed to a course. Later enrollment changes do not propagate here.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentTracking {
    pub assignment_code: String,
    pub course_code: String,
    pub assignment_details: Assignment,
    #[serde(default)]
    pub assigned_students: Vec<AssignedStudent>,
}

fn read_tracking(
    store: &Store,
    assignment_code: &str,
) -> Result<Option<AssignmentTracking>, HandlerErr> {
    read_doc(store, DocKind::Assignments, &store::assigned_doc(assignment_code))
}

fn assignments_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let assignment_code = get_required_str(params, "assignmentCode")?;
    let assignment_name = get_required_str(params, "assignmentName")?;
    let details = get_required_str(params, "details")?;
    let points = get_required_i64(params, "points")?;
    let deadline_date = get_required_str(params, "deadlineDate")?;
    let deadline_time = get_required_str(params, "deadlineTime")?;

    if grading::parse_deadline(&deadline_date, &deadline_time).is_none() {
        return Err(HandlerErr::new(
            "validation",
            "deadline must be YYYY-MM-DD and HH:MM",
        ));
    }

    let doc_name = store::assignment_doc(&assignment_code);
    if store.exists(DocKind::Assignments, &doc_name) {
        return Err(HandlerErr::new(
            "already_exists",
            format!("assignment with code {} already exists", assignment_code),
        ));
    }

    let assignment = Assignment {
        assignment_code: assignment_code.clone(),
        assignment_name,
        details,
        points,
        deadline_date,
        deadline_time,
    };
    write_doc(store, DocKind::Assignments, &doc_name, &assignment)?;

    Ok(json!({ "assignmentCode": assignment_code }))
}

fn assignment_summary(a: &Assignment) -> serde_json::Value {
    json!({
        "assignmentCode": a.assignment_code,
        "assignmentName": a.assignment_name,
        "details": a.details,
        "points": a.points,
        "deadlineDate": a.deadline_date,
        "deadlineTime": a.deadline_time,
    })
}

fn assignments_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let mut assignments = Vec::new();
    for doc_name in list_docs(store, DocKind::Assignments, SUFFIX_ASSIGNMENT)? {
        let Ok(Some(a)) = store.read::<Assignment>(DocKind::Assignments, &doc_name) else {
            continue;
        };
        assignments.push(assignment_summary(&a));
    }
    Ok(json!({ "assignments": assignments }))
}

fn assignments_assign(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let assignment_code = get_required_str(params, "assignmentCode")?;
    let course_code = get_required_str(params, "courseCode")?;

    let Some(assignment) = read_doc::<Assignment>(
        store,
        DocKind::Assignments,
        &store::assignment_doc(&assignment_code),
    )?
    else {
        return Err(HandlerErr::new(
            "assignment_not_found",
            format!("assignment {} does not exist", assignment_code),
        ));
    };
    let Some(course) = courses::read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course {} not found", course_code),
        ));
    };
    if course.enrolled_students.is_empty() {
        return Err(HandlerErr::new(
            "no_enrolled_students",
            format!("no students enrolled in course {}", course_code),
        ));
    }

    let tracking = AssignmentTracking {
        assignment_code: assignment_code.clone(),
        course_code: course_code.clone(),
        assignment_details: assignment,
        assigned_students: course
            .enrolled_students
            .iter()
            .map(|s| AssignedStudent {
                student_id: s.student_id.clone(),
                username: s.username.clone(),
                submission_status: None,
            })
            .collect(),
    };
    let assigned_count = tracking.assigned_students.len();
    write_doc(
        store,
        DocKind::Assignments,
        &store::assigned_doc(&assignment_code),
        &tracking,
    )?;

    Ok(json!({
        "assignmentCode": assignment_code,
        "courseCode": course_code,
        "assignedStudents": assigned_count,
    }))
}

fn assignments_for_student(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;

    let mut assignments = Vec::new();
    for doc_name in list_docs(store, DocKind::Assignments, SUFFIX_ASSIGNED)? {
        let Ok(Some(tracking)) =
            store.read::<AssignmentTracking>(DocKind::Assignments, &doc_name)
        else {
            continue;
        };
        let Some(entry) = tracking
            .assigned_students
            .iter()
            .find(|s| s.student_id == student_id)
        else {
            continue;
        };
        let mut summary = assignment_summary(&tracking.assignment_details);
        summary["courseCode"] = json!(tracking.course_code);
        summary["submissionStatus"] = json!(entry.submission_status);
        assignments.push(summary);
    }
    let total = assignments.len();
    Ok(json!({ "assignments": assignments, "total": total }))
}

fn assignments_submit(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let assignment_code = get_required_str(params, "assignmentCode")?;
    let details = get_required_str(params, "details")?;

    let Some(mut tracking) = read_tracking(store, &assignment_code)? else {
        return Err(HandlerErr::new(
            "tracking_not_found",
            format!("assignment {} has not been assigned", assignment_code),
        ));
    };
    let Some(idx) = tracking
        .assigned_students
        .iter()
        .position(|s| s.student_id == student_id)
    else {
        return Err(HandlerErr::new(
            "not_assigned",
            format!(
                "student {} is not assigned to assignment {}",
                student_id, assignment_code
            ),
        ));
    };
    if tracking.assigned_students[idx].submission_status.as_deref() == Some("Submitted") {
        return Err(HandlerErr::new(
            "already_submitted",
            format!("assignment {} was already submitted", assignment_code),
        ));
    }

    let deadline = grading::parse_deadline(
        &tracking.assignment_details.deadline_date,
        &tracking.assignment_details.deadline_time,
    )
    .ok_or_else(|| {
        HandlerErr::new(
            "corrupt",
            format!("assignment {} carries a malformed deadline", assignment_code),
        )
    })?;

    let stamp = match get_optional_str(params, "submittedAt") {
        Some(s) => s,
        None => grading::now_stamp(),
    };
    let Some(submitted) = grading::parse_stamp(&stamp) else {
        return Err(HandlerErr::new(
            "validation",
            "submittedAt must be YYYY-MM-DD HH:MM",
        ));
    };
    // Frozen at write time; re-reads never recompute this.
    let status = grading::submission_status(submitted, deadline);

    let username = tracking.assigned_students[idx].username.clone();
    let submission = json!({
        "course_code": tracking.course_code,
        "assignment_name": tracking.assignment_details.assignment_name,
        "assignment_code": assignment_code,
        "student_id": student_id,
        "username": username,
        "submission_details": details,
        "submission_timestamp": stamp,
        "deadline_date": tracking.assignment_details.deadline_date,
        "deadline_time": tracking.assignment_details.deadline_time,
        "status": status,
    });
    write_doc(
        store,
        DocKind::Assignments,
        &store::submission_doc(&student_id),
        &submission,
    )?;

    tracking.assigned_students[idx].submission_status = Some("Submitted".to_string());
    write_doc(
        store,
        DocKind::Assignments,
        &store::assigned_doc(&assignment_code),
        &tracking,
    )?;

    Ok(json!({ "status": status, "submittedAt": stamp }))
}

fn assignments_submissions(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let mut submissions = Vec::new();
    for doc_name in list_docs(store, DocKind::Assignments, SUFFIX_SUBMISSION)? {
        let Ok(Some(sub)) = store.read::<serde_json::Value>(DocKind::Assignments, &doc_name)
        else {
            continue;
        };
        submissions.push(json!({
            "studentId": sub.get("student_id"),
            "username": sub.get("username"),
            "assignmentCode": sub.get("assignment_code"),
            "assignmentName": sub.get("assignment_name"),
            "details": sub.get("submission_details"),
            "status": sub.get("status"),
            "score": sub.get("score").cloned().unwrap_or_else(|| json!("Not yet Scored")),
            "gradeRate": sub.get("grade_rate").cloned().unwrap_or_else(|| json!("Pending")),
        }));
    }
    Ok(json!({ "submissions": submissions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.create" => assignments_create(state, &req.params),
        "assignments.list" => assignments_list(state),
        "assignments.assign" => assignments_assign(state, &req.params),
        "assignments.forStudent" => assignments_for_student(state, &req.params),
        "assignments.submit" => assignments_submit(state, &req.params),
        "assignments.submissions" => assignments_submissions(state),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
