use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_elearnd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn elearnd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn register_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    username: &str,
    major: &str,
    year_level: &str,
    semester: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        id,
        "users.register",
        json!({
            "role": "student",
            "username": username,
            "password": "pw",
            "name": format!("Student {}", username),
            "email": format!("{}@college.edu", username),
            "birthdate": "2004-03-15",
            "address": "Dorm A",
            "gender": "M",
            "major": major,
            "yearLevel": year_level,
            "semester": semester,
            "academicYear": "2024-2025"
        }),
    );
    result
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string()
}

fn setup_course(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, code: &str) {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "rooms.create",
        json!({ "collegeRoom": "CCS", "roomNumber": code }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s2",
        "courses.add",
        json!({
            "courseCode": code,
            "courseName": format!("Course {}", code),
            "creditedUnits": 3,
            "collegeRoom": "CCS",
            "roomNumber": code,
            "day": "Monday",
            "startTime": "09:00",
            "endTime": "11:00"
        }),
    );
}

#[test]
fn enroll_updates_both_sides_and_is_rejected_the_second_time() {
    let workspace = temp_dir("elearn-enroll");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    setup_course(&mut stdin, &mut reader, "CS101");
    let student_id = register_student(
        &mut stdin,
        &mut reader,
        "2",
        "juan",
        "Computer Science",
        "1st Year",
        "1st Semester",
    );

    let before = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "enrollment.isEnrolled",
        json!({ "studentId": student_id, "courseCode": "CS101" }),
    );
    assert_eq!(before.get("enrolled").and_then(|v| v.as_bool()), Some(false));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "enrollment.enroll",
        json!({ "studentId": student_id, "courseCode": "CS101" }),
    );

    let after = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "enrollment.isEnrolled",
        json!({ "studentId": student_id, "courseCode": "CS101" }),
    );
    assert_eq!(after.get("enrolled").and_then(|v| v.as_bool()), Some(true));

    let counted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.enrolledCount",
        json!({ "courseCode": "CS101" }),
    );
    assert_eq!(counted.get("count").and_then(|v| v.as_u64()), Some(1));

    let again = request(
        &mut stdin,
        &mut reader,
        "7",
        "enrollment.enroll",
        json!({ "studentId": student_id, "courseCode": "CS101" }),
    );
    assert_eq!(error_code(&again), "already_enrolled");

    // The refused enroll must not have grown the roster.
    let recount = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "courses.enrolledCount",
        json!({ "courseCode": "CS101" }),
    );
    assert_eq!(recount.get("count").and_then(|v| v.as_u64()), Some(1));

    let schedule = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "courses.forStudent",
        json!({ "studentId": student_id }),
    );
    assert_eq!(schedule.get("total").and_then(|v| v.as_u64()), Some(1));
}

#[test]
fn drop_requires_confirmation_and_tolerates_a_missing_course_document() {
    let workspace = temp_dir("elearn-drop");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    setup_course(&mut stdin, &mut reader, "CS101");
    setup_course(&mut stdin, &mut reader, "CS102");
    let student_id = register_student(
        &mut stdin,
        &mut reader,
        "2",
        "maria",
        "Computer Science",
        "1st Year",
        "1st Semester",
    );
    for (i, code) in ["CS101", "CS102"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "enrollment.enroll",
            json!({ "studentId": student_id, "courseCode": code }),
        );
    }

    let unconfirmed = request(
        &mut stdin,
        &mut reader,
        "3",
        "enrollment.drop",
        json!({ "studentId": student_id, "courseCode": "CS101", "confirm": false }),
    );
    assert_eq!(error_code(&unconfirmed), "not_confirmed");

    let dropped = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "enrollment.drop",
        json!({ "studentId": student_id, "courseCode": "CS101", "confirm": true }),
    );
    assert_eq!(dropped.get("courseUpdated").and_then(|v| v.as_bool()), Some(true));

    // The course roster must have lost the student too.
    let roster = request_ok(
        &mut stdin,
        &mut reader,
        "4b",
        "courses.enrolledCount",
        json!({ "courseCode": "CS101" }),
    );
    assert_eq!(roster.get("count").and_then(|v| v.as_u64()), Some(0));

    let again = request(
        &mut stdin,
        &mut reader,
        "5",
        "enrollment.drop",
        json!({ "studentId": student_id, "courseCode": "CS101", "confirm": true }),
    );
    assert_eq!(error_code(&again), "not_enrolled");

    // Remove the course document out from under the enrollment; the
    // profile-side removal still succeeds.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.remove",
        json!({ "courseCode": "CS102" }),
    );

    // The schedule lists only resolvable courses; the stale ref is counted
    // separately.
    let schedule = request_ok(
        &mut stdin,
        &mut reader,
        "6b",
        "courses.forStudent",
        json!({ "studentId": student_id }),
    );
    assert_eq!(schedule.get("total").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(schedule.get("dangling").and_then(|v| v.as_u64()), Some(1));

    let orphaned = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "enrollment.drop",
        json!({ "studentId": student_id, "courseCode": "CS102", "confirm": true }),
    );
    assert_eq!(
        orphaned.get("courseUpdated").and_then(|v| v.as_bool()),
        Some(false)
    );
}

#[test]
fn batch_enroll_matches_the_section_exactly_and_skips_already_enrolled() {
    let workspace = temp_dir("elearn-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    setup_course(&mut stdin, &mut reader, "CS101");

    let a = register_student(
        &mut stdin,
        &mut reader,
        "2",
        "ana",
        "Computer Science",
        "1st Year",
        "1st Semester",
    );
    let _b = register_student(
        &mut stdin,
        &mut reader,
        "3",
        "ben",
        "Computer Science",
        "1st Year",
        "1st Semester",
    );
    // Different year level, must not match.
    let _c = register_student(
        &mut stdin,
        &mut reader,
        "4",
        "cara",
        "Computer Science",
        "2nd Year",
        "1st Semester",
    );
    // Case differs from the section filter, must not match.
    let _d = register_student(
        &mut stdin,
        &mut reader,
        "5",
        "dino",
        "computer science",
        "1st Year",
        "1st Semester",
    );

    // Pre-enroll one matching student so the batch skips them.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "enrollment.enroll",
        json!({ "studentId": a, "courseCode": "CS101" }),
    );

    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "enrollment.enrollBatch",
        json!({
            "program": "Computer Science",
            "yearLevel": "1st Year",
            "semester": "1st Semester",
            "courseCode": "CS101"
        }),
    );
    assert_eq!(batch.get("enrolled").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(batch.get("skipped").and_then(|v| v.as_u64()), Some(1));

    let counted = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "courses.enrolledCount",
        json!({ "courseCode": "CS101" }),
    );
    assert_eq!(counted.get("count").and_then(|v| v.as_u64()), Some(2));
}

#[test]
fn enrolling_an_unknown_student_or_course_fails_cleanly() {
    let workspace = temp_dir("elearn-enroll-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    setup_course(&mut stdin, &mut reader, "CS101");

    let no_student = request(
        &mut stdin,
        &mut reader,
        "2",
        "enrollment.enroll",
        json!({ "studentId": "24-ZZZZZ", "courseCode": "CS101" }),
    );
    assert_eq!(error_code(&no_student), "student_not_found");

    let student_id = register_student(
        &mut stdin,
        &mut reader,
        "3",
        "elio",
        "Computer Science",
        "1st Year",
        "1st Semester",
    );
    let no_course = request(
        &mut stdin,
        &mut reader,
        "4",
        "enrollment.enroll",
        json!({ "studentId": student_id, "courseCode": "NOPE" }),
    );
    assert_eq!(error_code(&no_course), "course_not_found");

    // isEnrolled never errors for unknown students.
    let unknown = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "enrollment.isEnrolled",
        json!({ "studentId": "24-ZZZZZ", "courseCode": "CS101" }),
    );
    assert_eq!(unknown.get("enrolled").and_then(|v| v.as_bool()), Some(false));
}
