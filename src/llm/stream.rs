//! Line decoding for streamed backend responses.
//!
//! Both newline-delimited JSON (Ollama) and `data:` framed event streams
//! (OpenAI-compatible) arrive as arbitrary byte chunks. This turns them into
//! complete text lines, enforcing an idle timeout between chunks.

use bytes::{Buf, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::provider::classify_reqwest_error;
use crate::types::{AppError, AppResult};

/// A lazy, finite sequence of generated text fragments. Dropping it releases
/// the backend connection.
pub type FragmentStream = BoxStream<'static, AppResult<String>>;

/// Longest line accepted from a backend before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Accumulates bytes and hands out complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
    // Bytes at the front of `buf` already known to hold no newline.
    scanned: usize,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Append a chunk and return every line it completed. `\r\n` endings are
    /// accepted; invalid UTF-8 is replaced rather than rejected.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(self.scanned + pos);
            self.buf.advance(1);
            self.scanned = 0;
            lines.push(Self::decode(&line));
        }
        self.scanned = self.buf.len();
        lines
    }

    /// True once the unterminated tail is longer than any line we accept.
    pub fn overflowed(&self) -> bool {
        self.buf.len() > self.max_line
    }

    /// Whatever is left after the final newline.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buf.is_empty() {
            return None;
        }
        let rest = self.buf.split();
        let line = Self::decode(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }

    fn decode(raw: &[u8]) -> String {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        String::from_utf8_lossy(raw).into_owned()
    }
}

struct LineState<S> {
    inner: S,
    buffer: LineBuffer,
    pending: VecDeque<String>,
    // Yielded after the lines completed before it.
    failure: Option<AppError>,
    finished: bool,
    idle_timeout: Duration,
    backend: String,
    url: String,
}

/// Split a response body into lines. An error or idle timeout is yielded once
/// and then the stream ends.
pub fn decode_lines<S>(
    body: S,
    idle_timeout: Duration,
    backend: &str,
    url: &str,
) -> BoxStream<'static, AppResult<String>>
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    let state = LineState {
        inner: Box::pin(body),
        buffer: LineBuffer::new(),
        pending: VecDeque::new(),
        failure: None,
        finished: false,
        idle_timeout,
        backend: backend.to_string(),
        url: url.to_string(),
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.pending.pop_front() {
                return Some((Ok(line), st));
            }
            if let Some(err) = st.failure.take() {
                return Some((Err(err), st));
            }
            if st.finished {
                return None;
            }

            match tokio::time::timeout(st.idle_timeout, st.inner.next()).await {
                Err(_) => {
                    st.finished = true;
                    st.failure = Some(AppError::Timeout {
                        backend: st.backend.clone(),
                        message: format!("no data for {}s", st.idle_timeout.as_secs()),
                    });
                }
                Ok(Some(Ok(chunk))) => {
                    st.pending.extend(st.buffer.push(&chunk));
                    if st.buffer.overflowed() {
                        st.finished = true;
                        st.failure = Some(AppError::MalformedResponse(format!(
                            "{}: line longer than {} bytes",
                            st.backend, MAX_LINE_BYTES
                        )));
                    }
                }
                Ok(Some(Err(e))) => {
                    st.finished = true;
                    st.failure = Some(classify_reqwest_error(&st.backend, &st.url, e));
                }
                Ok(None) => {
                    debug!(backend = %st.backend, "Backend stream closed");
                    st.finished = true;
                    st.pending.extend(st.buffer.finish());
                }
            }
        }
    })
    .boxed()
}

/// What a single backend line means for the fragment sequence.
#[derive(Debug)]
pub enum LineEvent {
    Fragment(String),
    /// Framing or keep-alive noise with no text.
    Skip,
    /// Unparseable line; logged and skipped.
    Malformed(String),
    /// The backend reported an error in-band.
    Failed(AppError),
    /// Natural completion, possibly carrying a last piece of text.
    Done(Option<String>),
}

struct FragmentState<F> {
    lines: BoxStream<'static, AppResult<String>>,
    parse: F,
    backend: String,
}

/// Turn decoded lines into fragments using a backend-specific parser. The
/// sequence ends at the first `Done`, `Failed` or transport error.
pub fn fragments_from_lines<F>(
    lines: BoxStream<'static, AppResult<String>>,
    backend: &str,
    parse: F,
) -> FragmentStream
where
    F: Fn(&str) -> LineEvent + Send + 'static,
{
    let state = FragmentState {
        lines,
        parse,
        backend: backend.to_string(),
    };

    stream::unfold(Some(state), |state| async move {
        let mut st = state?;
        loop {
            let line = match st.lines.next().await? {
                Ok(line) => line,
                Err(e) => return Some((Err(e), None)),
            };

            match (st.parse)(&line) {
                LineEvent::Fragment(text) => return Some((Ok(text), Some(st))),
                LineEvent::Skip => continue,
                LineEvent::Malformed(reason) => {
                    warn!(backend = %st.backend, %reason, "Skipping malformed stream chunk");
                    continue;
                }
                LineEvent::Failed(err) => return Some((Err(err), None)),
                LineEvent::Done(Some(text)) if !text.is_empty() => return Some((Ok(text), None)),
                LineEvent::Done(_) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"resp").is_empty());
        assert_eq!(buffer.push(b"onse\":\"A\"}\n{\"x\""), vec!["{\"response\":\"A\"}"]);
        assert_eq!(buffer.push(b":1}\r\n\n"), vec!["{\"x\":1}", ""]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_trailing_line() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"first\nsecond"), vec!["first"]);
        assert_eq!(buffer.finish(), Some("second".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[tokio::test]
    async fn test_decode_lines_preserves_order() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"a\nb")),
            Ok(Bytes::from_static(b"c\n")),
            Ok(Bytes::from_static(b"d")),
        ];
        let lines: Vec<String> = decode_lines(stream::iter(chunks), Duration::from_secs(1), "test", "http://test")
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, vec!["a", "bc", "d"]);
    }

    #[test]
    fn test_line_buffer_flags_unterminated_line() {
        let mut buffer = LineBuffer::with_max_line(8);
        assert_eq!(buffer.push(b"short\n0123"), vec!["short"]);
        assert!(!buffer.overflowed());
        assert!(buffer.push(b"45678").is_empty());
        assert!(buffer.overflowed());
    }

    #[tokio::test]
    async fn test_decode_lines_rejects_endless_line() {
        let mut chunk = b"ok\n".to_vec();
        chunk.extend(std::iter::repeat(b'x').take(MAX_LINE_BYTES + 1));
        let body = stream::iter(vec![Ok::<_, reqwest::Error>(Bytes::from(chunk))]).chain(stream::pending());
        let mut lines = decode_lines(body, Duration::from_secs(5), "ollama", "http://test");

        assert_eq!(lines.next().await.unwrap().unwrap(), "ok");
        assert!(matches!(lines.next().await.unwrap(), Err(AppError::MalformedResponse(_))));
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_lines_idle_timeout() {
        let body = stream::pending::<reqwest::Result<Bytes>>();
        let mut lines = decode_lines(body, Duration::from_millis(20), "ollama", "http://test");

        let first = lines.next().await.unwrap();
        assert!(matches!(first, Err(AppError::Timeout { .. })));
        assert!(lines.next().await.is_none());
    }

    fn parse_test_line(line: &str) -> LineEvent {
        match line {
            "" => LineEvent::Skip,
            "bad" => LineEvent::Malformed("not a record".to_string()),
            "fail" => LineEvent::Failed(AppError::LLMApi("boom".to_string())),
            l if l.starts_with("done:") => LineEvent::Done(Some(l["done:".len()..].to_string())),
            l => LineEvent::Fragment(l.to_string()),
        }
    }

    fn line_stream(lines: &[&str]) -> BoxStream<'static, AppResult<String>> {
        let owned: Vec<AppResult<String>> = lines.iter().map(|l| Ok(l.to_string())).collect();
        stream::iter(owned).boxed()
    }

    #[tokio::test]
    async fn test_fragments_stop_at_done() {
        let lines = line_stream(&["A", "", "bad", "B", "done:C", "never"]);
        let out: Vec<AppResult<String>> = fragments_from_lines(lines, "test", parse_test_line).collect().await;
        let text: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(text, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_fragments_end_after_failure() {
        let lines = line_stream(&["A", "fail", "B"]);
        let out: Vec<AppResult<String>> = fragments_from_lines(lines, "test", parse_test_line).collect().await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "A");
        assert!(matches!(out[1], Err(AppError::LLMApi(_))));
    }
}
