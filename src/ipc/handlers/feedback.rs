use serde_json::json;

use super::users;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_required_str, read_doc, store_of, write_doc, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, DocKind, Role};

fn feedback_send(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let course_code = get_required_str(params, "courseCode")?;
    let instructor_id = get_required_str(params, "instructorId")?;
    let feedback = get_required_str(params, "feedback")?;

    if users::read_profile(store, &instructor_id, Role::Instructor)?.is_none() {
        return Err(HandlerErr::new(
            "instructor_not_found",
            format!("instructor with id {} was not found", instructor_id),
        ));
    }

    let doc_name = store::feedback_doc(&instructor_id);
    let mut entries: Vec<serde_json::Value> =
        read_doc(store, DocKind::Feedback, &doc_name)?.unwrap_or_default();
    entries.push(json!({
        "course_code": course_code,
        "instructor_id": instructor_id,
        "feedback": feedback,
    }));
    let total = entries.len();
    write_doc(store, DocKind::Feedback, &doc_name, &entries)?;

    Ok(json!({ "instructorId": instructor_id, "total": total }))
}

fn feedback_list(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let instructor_id = get_required_str(params, "instructorId")?;

    let entries: Vec<serde_json::Value> =
        read_doc(store, DocKind::Feedback, &store::feedback_doc(&instructor_id))?
            .unwrap_or_default();

    let feedbacks: Vec<serde_json::Value> = entries
        .iter()
        .filter(|e| {
            e.get("instructor_id").and_then(|v| v.as_str()) == Some(instructor_id.as_str())
        })
        .map(|e| {
            json!({
                "courseCode": e.get("course_code"),
                "feedback": e.get("feedback"),
            })
        })
        .collect();
    let total = feedbacks.len();

    Ok(json!({ "feedbacks": feedbacks, "total": total }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "feedback.send" => feedback_send(state, &req.params),
        "feedback.list" => feedback_list(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
