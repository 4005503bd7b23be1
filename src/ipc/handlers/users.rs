use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, get_required_str, list_docs, read_doc, store_of, write_doc, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{
    self, DocKind, Role, Store, SUFFIX_ADMIN_PROFILE, SUFFIX_INSTRUCTOR_PROFILE, SUFFIX_PROFILE,
    SUFFIX_STUDENT_PROFILE,
};

pub fn read_profile(
    store: &Store,
    user_id: &str,
    role: Role,
) -> Result<Option<serde_json::Value>, HandlerErr> {
    read_doc(store, DocKind::Users, &store::profile_doc(user_id, role))
}

pub fn write_profile(
    store: &Store,
    user_id: &str,
    role: Role,
    profile: &serde_json::Value,
) -> Result<(), HandlerErr> {
    write_doc(store, DocKind::Users, &store::profile_doc(user_id, role), profile)
}

/// User ids look like `24-1A3F9`: a year prefix plus the first five
/// characters of a v4 UUID, uppercased.
fn generate_user_id() -> String {
    let raw = Uuid::new_v4().to_string();
    format!("24-{}", raw[..5].to_uppercase())
}

fn parse_role(params: &serde_json::Value) -> Result<Role, HandlerErr> {
    let role = get_required_str(params, "role")?;
    Role::parse(&role)
        .ok_or_else(|| HandlerErr::new("bad_params", "role must be student, instructor or admin"))
}

fn username_exists(store: &Store, username: &str) -> Result<bool, HandlerErr> {
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_PROFILE)? {
        let Ok(Some(profile)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        if profile.get("username").and_then(|v| v.as_str()) == Some(username) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn users_register(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let role = parse_role(params)?;
    let username = get_required_str(params, "username")?;
    // Plaintext by design; this platform has no security story.
    let password = get_required_str(params, "password")?;
    let name = get_required_str(params, "name")?;
    let email = get_required_str(params, "email")?;
    let birthdate = get_required_str(params, "birthdate")?;
    let address = get_required_str(params, "address")?;
    let gender = get_required_str(params, "gender")?;

    if NaiveDate::parse_from_str(&birthdate, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::new("validation", "birthdate must be YYYY-MM-DD"));
    }
    if username_exists(store, &username)? {
        return Err(HandlerErr::new(
            "already_exists",
            format!("account {} already exists", username),
        ));
    }

    let user_id = generate_user_id();
    let mut profile = json!({
        "user_id": user_id,
        "username": username,
        "password": password,
        "name": name,
        "email": email,
        "birthdate": birthdate,
        "address": address,
        "gender": gender,
    });

    match role {
        Role::Student => {
            profile["major"] = json!(get_required_str(params, "major")?);
            profile["year_level"] = json!(get_required_str(params, "yearLevel")?);
            profile["semester"] = json!(get_required_str(params, "semester")?);
            profile["academic_year"] = json!(get_required_str(params, "academicYear")?);
            profile["courses"] = json!([]);
        }
        Role::Instructor => {
            profile["department"] = json!(get_required_str(params, "department")?);
            profile["specialization"] = json!(get_required_str(params, "specialization")?);
            profile["assigned_courses"] = json!([]);
        }
        Role::Admin => {}
    }

    write_profile(store, &user_id, role, &profile)?;

    Ok(json!({ "userId": user_id, "role": role.as_str() }))
}

fn users_login(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let role = parse_role(params)?;
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;

    let suffix = format!("_{}_profile.json", role.as_str());
    for profile_name in list_docs(store, DocKind::Users, &suffix)? {
        let Ok(Some(profile)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        if profile.get("username").and_then(|v| v.as_str()) == Some(username.as_str())
            && profile.get("password").and_then(|v| v.as_str()) == Some(password.as_str())
        {
            return Ok(json!({ "profile": profile }));
        }
    }
    Err(HandlerErr::new(
        "invalid_credentials",
        "username or password did not match",
    ))
}

fn users_profile(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let role = parse_role(params)?;
    let user_id = get_required_str(params, "userId")?;
    let Some(profile) = read_profile(store, &user_id, role)? else {
        return Err(HandlerErr::new(
            "not_found",
            format!("no {} profile for {}", role.as_str(), user_id),
        ));
    };
    Ok(json!({ "profile": profile }))
}

fn eq_ignore_case(profile: &serde_json::Value, key: &str, wanted: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(w) => profile
            .get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.eq_ignore_ascii_case(w))
            .unwrap_or(false),
    }
}

fn users_list_students(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let major = get_optional_str(params, "major");
    let year_level = get_optional_str(params, "yearLevel");
    let semester = get_optional_str(params, "semester");
    let academic_year = get_optional_str(params, "academicYear");

    let mut students = Vec::new();
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_STUDENT_PROFILE)? {
        let Ok(Some(profile)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        if !(eq_ignore_case(&profile, "major", &major)
            && eq_ignore_case(&profile, "year_level", &year_level)
            && eq_ignore_case(&profile, "semester", &semester)
            && eq_ignore_case(&profile, "academic_year", &academic_year))
        {
            continue;
        }
        students.push(json!({
            "userId": profile.get("user_id"),
            "username": profile.get("username"),
            "name": profile.get("name"),
            "major": profile.get("major"),
            "yearLevel": profile.get("year_level"),
            "semester": profile.get("semester"),
            "academicYear": profile.get("academic_year"),
        }));
    }
    let total = students.len();
    Ok(json!({ "students": students, "total": total }))
}

fn users_list_instructors(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let mut instructors = Vec::new();
    for profile_name in list_docs(store, DocKind::Users, SUFFIX_INSTRUCTOR_PROFILE)? {
        let Ok(Some(profile)) = store.read::<serde_json::Value>(DocKind::Users, &profile_name)
        else {
            continue;
        };
        let assigned: Vec<serde_json::Value> = profile
            .get("assigned_courses")
            .and_then(|v| v.as_array())
            .map(|courses| {
                courses
                    .iter()
                    .map(|c| {
                        json!({
                            "courseCode": c.get("course_code"),
                            "courseName": c.get("course_name"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        instructors.push(json!({
            "userId": profile.get("user_id"),
            "name": profile.get("name"),
            "department": profile.get("department"),
            "assignedCourses": assigned,
        }));
    }
    let total = instructors.len();
    Ok(json!({ "instructors": instructors, "total": total }))
}

/// Totals come from directory listings at call time; nothing is counted in
/// memory across requests.
fn users_counts(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let students = list_docs(store, DocKind::Users, SUFFIX_STUDENT_PROFILE)?.len();
    let instructors = list_docs(store, DocKind::Users, SUFFIX_INSTRUCTOR_PROFILE)?.len();
    let admins = list_docs(store, DocKind::Users, SUFFIX_ADMIN_PROFILE)?.len();
    Ok(json!({ "students": students, "instructors": instructors, "admins": admins }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "users.register" => users_register(state, &req.params),
        "users.login" => users_login(state, &req.params),
        "users.profile" => users_profile(state, &req.params),
        "users.listStudents" => users_list_students(state, &req.params),
        "users.listInstructors" => users_list_instructors(state),
        "users.counts" => users_counts(state),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
