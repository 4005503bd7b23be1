use serde_json::json;

use super::courses;
use crate::grading;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_f64, get_required_str, read_doc, store_of, write_doc, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, DocKind};

fn grades_score(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let assignment_code = get_required_str(params, "assignmentCode")?;
    let score = get_required_f64(params, "score")?;

    let doc_name = store::submission_doc(&student_id);
    let Some(mut submission) =
        read_doc::<serde_json::Value>(store, DocKind::Assignments, &doc_name)?
    else {
        return Err(HandlerErr::new(
            "submission_not_found",
            format!("no submission from student {}", student_id),
        ));
    };
    if submission.get("assignment_code").and_then(|v| v.as_str()) != Some(assignment_code.as_str())
    {
        return Err(HandlerErr::new(
            "submission_not_found",
            format!(
                "no submission from student {} for assignment {}",
                student_id, assignment_code
            ),
        ));
    }
    if submission.get("score").is_some() {
        return Err(HandlerErr::with_details(
            "already_graded",
            "submission has already been scored",
            json!({
                "score": submission.get("score"),
                "gradeRate": submission.get("grade_rate"),
            }),
        ));
    }
    if !(0.0..=100.0).contains(&score) {
        return Err(HandlerErr::new(
            "validation",
            "score must be between 0 and 100",
        ));
    }

    let rate = grading::grade_rate(score);
    submission["score"] = json!(score);
    submission["grade_rate"] = json!(rate);
    write_doc(store, DocKind::Assignments, &doc_name, &submission)?;

    Ok(json!({ "score": score, "gradeRate": rate }))
}

fn grades_assign_overall(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;
    let course_code = get_required_str(params, "courseCode")?;
    let grade = get_required_f64(params, "grade")?;

    let Some(course) = courses::read_course(store, &course_code)? else {
        return Err(HandlerErr::new(
            "course_not_found",
            format!("course with code {} was not found", course_code),
        ));
    };
    if !course
        .enrolled_students
        .iter()
        .any(|s| s.student_id == student_id)
    {
        return Err(HandlerErr::new(
            "not_enrolled",
            format!(
                "student {} is not enrolled in course {}",
                student_id, course_code
            ),
        ));
    }

    // Overall grades are write-once; there is no amendment path.
    let doc_name = store::grade_doc(&student_id);
    if store.exists(DocKind::Grades, &doc_name) {
        return Err(HandlerErr::new(
            "already_graded",
            format!("student {} already has an overall grade on record", student_id),
        ));
    }
    if !(0.0..=100.0).contains(&grade) {
        return Err(HandlerErr::new(
            "validation",
            "grade must be between 0 and 100",
        ));
    }

    let record = json!([{ "course_code": course_code, "grade": grade }]);
    write_doc(store, DocKind::Grades, &doc_name, &record)?;

    Ok(json!({ "studentId": student_id, "courseCode": course_code, "grade": grade }))
}

fn grades_view(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let student_id = get_required_str(params, "studentId")?;

    let entries: Vec<serde_json::Value> =
        read_doc(store, DocKind::Grades, &store::grade_doc(&student_id))?.unwrap_or_default();

    let mut grades = Vec::new();
    let mut sum = 0.0f64;
    let mut counted = 0usize;
    for entry in &entries {
        let grade = entry.get("grade").and_then(|v| v.as_f64());
        if let Some(g) = grade {
            sum += g;
            counted += 1;
        }
        grades.push(json!({
            "courseCode": entry.get("course_code"),
            "grade": entry.get("grade"),
        }));
    }
    let average = if counted > 0 { sum / counted as f64 } else { 0.0 };

    Ok(json!({ "grades": grades, "average": average }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.score" => grades_score(state, &req.params),
        "grades.assignOverall" => grades_assign_overall(state, &req.params),
        "grades.view" => grades_view(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
