use axum::response::sse::Event;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::FragmentStream;
use crate::relay::sse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
}

/// One in-flight relay from a backend fragment stream to a single client.
///
/// Fragments are forwarded in arrival order with no buffering. The session
/// closes after its terminal frame; if it is dropped while still open the
/// client went away, and the backend stream is dropped with it.
pub struct StreamSession {
    id: Uuid,
    fragments: FragmentStream,
    state: SessionState,
    emitted: usize,
    started: Instant,
}

impl StreamSession {
    pub fn new(fragments: FragmentStream) -> Self {
        Self {
            id: Uuid::new_v4(),
            fragments,
            state: SessionState::Open,
            emitted: 0,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Pull the next frame, or `None` once the terminal frame has been sent.
    async fn next_event(&mut self) -> Option<Event> {
        if !self.is_open() {
            return None;
        }

        match self.fragments.next().await {
            Some(Ok(fragment)) => {
                self.emitted += 1;
                Some(sse::fragment_event(&fragment))
            }
            Some(Err(err)) => {
                self.close();
                warn!(
                    session_id = %self.id,
                    fragments = self.emitted,
                    error = %err,
                    "Backend stream failed"
                );
                Some(sse::error_event(&err))
            }
            None => {
                self.close();
                info!(
                    session_id = %self.id,
                    fragments = self.emitted,
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "Stream completed"
                );
                Some(sse::end_event())
            }
        }
    }

    pub fn into_events(self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        stream::unfold(self, |mut session| async move {
            let event = session.next_event().await?;
            Some((Ok(event), session))
        })
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.is_open() {
            info!(
                session_id = %self.id,
                fragments = self.emitted,
                "Client disconnected; releasing backend stream"
            );
        } else {
            debug!(session_id = %self.id, "Stream session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AppError, AppResult};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn fragments(items: Vec<AppResult<String>>) -> FragmentStream {
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn test_completion_emits_end_once() {
        let mut session = StreamSession::new(fragments(vec![Ok("Hel".into()), Ok("lo".into())]));

        for _ in 0..3 {
            assert!(session.next_event().await.is_some());
        }
        assert!(!session.is_open());
        assert!(session.next_event().await.is_none());
        assert_eq!(session.emitted, 2);
    }

    #[tokio::test]
    async fn test_error_closes_session_and_stops_reading() {
        let items = vec![
            Ok("A".to_string()),
            Err(AppError::BackendUnreachable {
                backend: "ollama".into(),
                url: "http://localhost:11434".into(),
            }),
            Ok("never sent".to_string()),
        ];
        let events: Vec<_> = StreamSession::new(fragments(items)).into_events().collect().await;
        // fragment + error frame, nothing after
        assert_eq!(events.len(), 2);
    }

    struct ReleaseFlag(Arc<AtomicBool>);

    impl Drop for ReleaseFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_open_session_releases_backend() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = ReleaseFlag(released.clone());
        // Never ends on its own, like a wedged or slow backend.
        let backend = stream::iter(vec![Ok("first".to_string())])
            .chain(stream::pending())
            .map(move |item| {
                let _keep = &guard;
                item
            })
            .boxed();

        let mut events = Box::pin(StreamSession::new(backend).into_events());
        assert!(events.next().await.is_some());
        assert!(!released.load(Ordering::SeqCst));

        drop(events);
        assert!(released.load(Ordering::SeqCst));
    }
}
