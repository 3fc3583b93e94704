//! SSE frames
//!
//! Fragments go out as `data: {"content": ...}`. A stream always ends with
//! exactly one terminal frame: `event: end` or `event: error`.

use axum::response::sse::Event;
use serde_json::json;

use crate::types::AppError;

pub const END_EVENT: &str = "end";
pub const ERROR_EVENT: &str = "error";
pub const END_MESSAGE: &str = "Stream completed";

pub fn fragment_event(fragment: &str) -> Event {
    Event::default().data(json!({ "content": fragment }).to_string())
}

pub fn end_event() -> Event {
    Event::default()
        .event(END_EVENT)
        .data(json!({ "message": END_MESSAGE }).to_string())
}

pub fn error_event(err: &AppError) -> Event {
    Event::default()
        .event(ERROR_EVENT)
        .data(json!({ "error": err.to_string() }).to_string())
}
