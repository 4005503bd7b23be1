use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_required_str, list_docs, read_doc, remove_doc, store_of, write_doc, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, DocKind, Store, SUFFIX_ROOM};
use crate::timetable::{self, ScheduleSlot};

#[derive(Debug, Serialize, Deserialize)]
pub struct Room {
    pub assigned_college_room: String,
    pub room_number: String,
    #[serde(default)]
    pub scheduled_times: Vec<ScheduleSlot>,
}

pub enum SlotReservation {
    Reserved,
    NotRegistered,
    Conflict(ScheduleSlot),
}

/// Check a proposed slot against a room's existing schedule and, when clear,
/// append and persist it. This is the sole mutation path for room schedules.
/// The reservation is not rolled back if the caller fails afterwards.
pub fn check_and_reserve_slot(
    store: &Store,
    college_room: &str,
    room_number: &str,
    day: &str,
    start_time: &str,
    end_time: &str,
) -> Result<SlotReservation, HandlerErr> {
    let (Some(start), Some(end)) = (
        timetable::time_to_minutes(start_time),
        timetable::time_to_minutes(end_time),
    ) else {
        return Err(HandlerErr::new(
            "validation",
            "start and end times must be HH:MM",
        ));
    };

    let name = store::room_doc(college_room, room_number);
    let Some(mut room) = read_doc::<Room>(store, DocKind::Rooms, &name)? else {
        return Ok(SlotReservation::NotRegistered);
    };

    if let Some(hit) = timetable::find_conflict(&room.scheduled_times, day, start, end) {
        return Ok(SlotReservation::Conflict(hit.clone()));
    }

    room.scheduled_times.push(ScheduleSlot {
        day: day.to_string(),
        start_time: start_time.to_string(),
        end_time: end_time.to_string(),
    });
    write_doc(store, DocKind::Rooms, &name, &room)?;
    Ok(SlotReservation::Reserved)
}

fn rooms_create(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let college_room = get_required_str(params, "collegeRoom")?.to_uppercase();
    let room_number = get_required_str(params, "roomNumber")?;

    let name = store::room_doc(&college_room, &room_number);
    if store.exists(DocKind::Rooms, &name) {
        return Err(HandlerErr::new(
            "already_exists",
            format!("room {} {} already exists", college_room, room_number),
        ));
    }

    let room = Room {
        assigned_college_room: college_room.clone(),
        room_number: room_number.clone(),
        scheduled_times: Vec::new(),
    };
    write_doc(store, DocKind::Rooms, &name, &room)?;

    Ok(json!({ "collegeRoom": college_room, "roomNumber": room_number }))
}

fn rooms_list(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let mut rooms = Vec::new();
    for name in list_docs(store, DocKind::Rooms, SUFFIX_ROOM)? {
        // Display path: unreadable documents are skipped, not fatal.
        let Ok(Some(room)) = store.read::<Room>(DocKind::Rooms, &name) else {
            continue;
        };
        let slots: Vec<serde_json::Value> = room
            .scheduled_times
            .iter()
            .map(|s| {
                json!({
                    "day": s.day,
                    "startTime": s.start_time,
                    "endTime": s.end_time,
                })
            })
            .collect();
        rooms.push(json!({
            "collegeRoom": room.assigned_college_room,
            "roomNumber": room.room_number,
            "slotCount": room.scheduled_times.len(),
            "scheduledTimes": slots,
        }));
    }
    Ok(json!({ "rooms": rooms }))
}

fn rooms_remove(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_of(state)?;
    let college_room = get_required_str(params, "collegeRoom")?.to_uppercase();
    let room_number = get_required_str(params, "roomNumber")?;

    // Unconditional delete; courses referencing this room are left alone.
    let name = store::room_doc(&college_room, &room_number);
    if !remove_doc(store, DocKind::Rooms, &name)? {
        return Err(HandlerErr::new(
            "not_found",
            format!("room {} {} not found", college_room, room_number),
        ));
    }
    Ok(json!({ "removed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "rooms.create" => rooms_create(state, &req.params),
        "rooms.list" => rooms_list(state),
        "rooms.remove" => rooms_remove(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(value) => ok(&req.id, value),
        Err(e) => e.response(&req.id),
    })
}
