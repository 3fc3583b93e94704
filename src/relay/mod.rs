//! Streaming relay
//!
//! Turns a backend fragment stream into a server-sent-event response. Once
//! the response head is sent the status is committed to 200, so every later
//! failure has to travel in-band as an `error` frame.

pub mod session;
pub mod sse;

pub use session::StreamSession;

use axum::http::header::HeaderName;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};

/// Tells reverse proxies (nginx and friends) not to buffer the stream.
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Build the event-stream response for a session. `Sse` supplies the
/// `text/event-stream` content type and `Cache-Control: no-cache`.
pub fn sse_response(session: StreamSession) -> Response {
    let sse = Sse::new(session.into_events()).keep_alive(KeepAlive::default());
    ([(X_ACCEL_BUFFERING, "no")], sse).into_response()
}

/// Parse an event-stream body into `(event name, data)` pairs. Comment lines
/// (keep-alives) are ignored; frames without an `event:` field are `message`.
#[cfg(test)]
pub(crate) fn parse_frames(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = "message".to_string();
            let mut data = None;
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = name.trim().to_string();
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data = serde_json::from_str(payload.trim()).ok();
                }
            }
            data.map(|d| (event, d))
        })
        .collect()
}
