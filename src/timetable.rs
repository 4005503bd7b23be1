use serde::{Deserialize, Serialize};

/// One reserved (day, start, end) interval against a specific room. Times are
/// stored as the `HH:MM` strings the documents carry; comparisons happen in
/// minutes-since-midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSlot {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

pub fn time_to_minutes(time: &str) -> Option<u32> {
    let (h, m) = time.split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Half-open interval semantics: an interval ending exactly when another
/// starts does not conflict.
pub fn times_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    !(a_end <= b_start || a_start >= b_end)
}

/// First existing slot on `day` that overlaps [start, end), if any. Slots
/// whose stored times fail to parse are skipped rather than treated as
/// conflicts.
pub fn find_conflict<'a>(
    existing: &'a [ScheduleSlot],
    day: &str,
    start: u32,
    end: u32,
) -> Option<&'a ScheduleSlot> {
    existing.iter().find(|slot| {
        if slot.day != day {
            return false;
        }
        let (Some(slot_start), Some(slot_end)) = (
            time_to_minutes(&slot.start_time),
            time_to_minutes(&slot.end_time),
        ) else {
            return false;
        };
        times_overlap(start, end, slot_start, slot_end)
    })
}

/// Monday..Friday sort 1..5; anything unrecognized sorts last.
pub fn day_rank(day: &str) -> u8 {
    match day {
        "Monday" => 1,
        "Tuesday" => 2,
        "Wednesday" => 3,
        "Thursday" => 4,
        "Friday" => 5,
        _ => 6,
    }
}

/// Sort key for timetable displays: weekday, then start time. Unparsable
/// start times sort to end of day.
pub fn timetable_sort_key(day: &str, start_time: &str) -> (u8, u32) {
    (day_rank(day), time_to_minutes(start_time).unwrap_or(23 * 60 + 59))
}
