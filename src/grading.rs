use chrono::NaiveDateTime;

pub const STATUS_ON_TIME: &str = "On Time";
pub const STATUS_LATE: &str = "Late";

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Combine a `YYYY-MM-DD` date and `HH:MM` time into a deadline at minute
/// resolution.
pub fn parse_deadline(date: &str, time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), STAMP_FORMAT).ok()
}

pub fn parse_stamp(stamp: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}

/// Current local time formatted the way submission timestamps are stored.
/// Formatting truncates to the minute, matching the deadline resolution.
pub fn now_stamp() -> String {
    chrono::Local::now().format(STAMP_FORMAT).to_string()
}

/// Strictly after the deadline is late; at the deadline minute is on time.
/// The status is computed once at submission and frozen in the document.
pub fn submission_status(submitted: NaiveDateTime, deadline: NaiveDateTime) -> &'static str {
    if submitted > deadline {
        STATUS_LATE
    } else {
        STATUS_ON_TIME
    }
}

/// Categorical rate bands, inclusive on the lower bound of each band.
pub fn grade_rate(score: f64) -> &'static str {
    if score >= 90.0 {
        "Excellent"
    } else if score >= 80.0 {
        "Good"
    } else if score >= 70.0 {
        "Average"
    } else if score >= 60.0 {
        "Below Average"
    } else {
        "Failed"
    }
}
