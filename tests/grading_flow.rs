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

fn setup_submitted_assignment(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "s1",
        "rooms.create",
        json!({ "collegeRoom": "CCS", "roomNumber": "301" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s2",
        "courses.add",
        json!({
            "courseCode": "CS101",
            "courseName": "Intro to Computing",
            "creditedUnits": 3,
            "collegeRoom": "CCS",
            "roomNumber": "301",
            "day": "Monday",
            "startTime": "09:00",
            "endTime": "11:00"
        }),
    );
    let registered = request_ok(
        stdin,
        reader,
        "s3",
        "users.register",
        json!({
            "role": "student",
            "username": "juan",
            "password": "pw",
            "name": "Student juan",
            "email": "juan@college.edu",
            "birthdate": "2004-03-15",
            "address": "Dorm A",
            "gender": "M",
            "major": "Computer Science",
            "yearLevel": "1st Year",
            "semester": "1st Semester",
            "academicYear": "2024-2025"
        }),
    );
    let student_id = registered
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string();
    let _ = request_ok(
        stdin,
        reader,
        "s4",
        "enrollment.enroll",
        json!({ "studentId": student_id, "courseCode": "CS101" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s5",
        "assignments.create",
        json!({
            "assignmentCode": "HW1",
            "assignmentName": "Homework 1",
            "details": "Exercises",
            "points": 100,
            "deadlineDate": "2024-01-10",
            "deadlineTime": "23:59"
        }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s6",
        "assignments.assign",
        json!({ "assignmentCode": "HW1", "courseCode": "CS101" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "s7",
        "assignments.submit",
        json!({
            "studentId": student_id,
            "assignmentCode": "HW1",
            "details": "answers",
            "submittedAt": "2024-01-10 10:00"
        }),
    );
    student_id
}

#[test]
fn scoring_a_submission_is_write_once_and_banded() {
    let workspace = temp_dir("elearn-score");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = setup_submitted_assignment(&mut stdin, &mut reader);

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.score",
        json!({ "studentId": student_id, "assignmentCode": "HW1", "score": 101.0 }),
    );
    assert_eq!(error_code(&out_of_range), "validation");

    let scored = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "grades.score",
        json!({ "studentId": student_id, "assignmentCode": "HW1", "score": 85.0 }),
    );
    assert_eq!(scored.get("gradeRate").and_then(|v| v.as_str()), Some("Good"));

    let again = request(
        &mut stdin,
        &mut reader,
        "4",
        "grades.score",
        json!({ "studentId": student_id, "assignmentCode": "HW1", "score": 95.0 }),
    );
    assert_eq!(error_code(&again), "already_graded");
    let details = again
        .get("error")
        .and_then(|e| e.get("details"))
        .cloned()
        .expect("details");
    assert_eq!(details.get("score").and_then(|v| v.as_f64()), Some(85.0));

    let submissions = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.submissions",
        json!({}),
    );
    let row = submissions
        .get("submissions")
        .and_then(|v| v.as_array())
        .and_then(|rows| rows.first())
        .cloned()
        .expect("submission row");
    assert_eq!(row.get("score").and_then(|v| v.as_f64()), Some(85.0));
    assert_eq!(row.get("gradeRate").and_then(|v| v.as_str()), Some("Good"));
}

#[test]
fn scoring_requires_a_matching_submission() {
    let workspace = temp_dir("elearn-score-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = setup_submitted_assignment(&mut stdin, &mut reader);

    let nobody = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.score",
        json!({ "studentId": "24-ZZZZZ", "assignmentCode": "HW1", "score": 80.0 }),
    );
    assert_eq!(error_code(&nobody), "submission_not_found");

    // A submission exists for the student, but for a different assignment.
    let wrong_code = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.score",
        json!({ "studentId": student_id, "assignmentCode": "HW9", "score": 80.0 }),
    );
    assert_eq!(error_code(&wrong_code), "submission_not_found");
}

#[test]
fn overall_grade_requires_enrollment_and_is_immutable() {
    let workspace = temp_dir("elearn-overall");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let student_id = setup_submitted_assignment(&mut stdin, &mut reader);

    let no_course = request(
        &mut stdin,
        &mut reader,
        "2",
        "grades.assignOverall",
        json!({ "studentId": student_id, "courseCode": "NOPE", "grade": 90.0 }),
    );
    assert_eq!(error_code(&no_course), "course_not_found");

    let outsider = request(
        &mut stdin,
        &mut reader,
        "3",
        "grades.assignOverall",
        json!({ "studentId": "24-ZZZZZ", "courseCode": "CS101", "grade": 90.0 }),
    );
    assert_eq!(error_code(&outsider), "not_enrolled");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "grades.assignOverall",
        json!({ "studentId": student_id, "courseCode": "CS101", "grade": 92.5 }),
    );

    let again = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.assignOverall",
        json!({ "studentId": student_id, "courseCode": "CS101", "grade": 70.0 }),
    );
    assert_eq!(error_code(&again), "already_graded");

    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "grades.view",
        json!({ "studentId": student_id }),
    );
    let grades = viewed
        .get("grades")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("grades");
    assert_eq!(grades.len(), 1);
    assert_eq!(
        grades[0].get("courseCode").and_then(|v| v.as_str()),
        Some("CS101")
    );
    assert_eq!(viewed.get("average").and_then(|v| v.as_f64()), Some(92.5));
}

#[test]
fn viewing_grades_for_an_ungraded_student_is_empty_not_an_error() {
    let workspace = temp_dir("elearn-view-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let viewed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "grades.view",
        json!({ "studentId": "24-ZZZZZ" }),
    );
    assert_eq!(
        viewed.get("grades").and_then(|v| v.as_array()).map(|g| g.len()),
        Some(0)
    );
    assert_eq!(viewed.get("average").and_then(|v| v.as_f64()), Some(0.0));
}
