// src/stream.rs

use crate::errors::InferenceError;
use futures::{Stream, StreamExt};
use log::debug;
use serde_json::Value;
use std::time::Instant;

/// What the reader hands to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental text of the assistant reply
    Fragment(String),
    /// Generation speed reported by the server, in tokens per second
    TokenRate(f32),
    Done,
}

/// Contents of one `data:` entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub fragment: Option<String>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SseRecord {
    Chunk(StreamChunk),
    Done,
}

/// Parses one SSE line. Anything that is not a well-formed `data:` entry
/// yields `None`.
pub fn parse_sse_line(line: &str) -> Option<SseRecord> {
    let payload = line.strip_prefix("data:")?;
    let payload = payload.strip_prefix(' ').unwrap_or(payload).trim_end();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        return Some(SseRecord::Done);
    }

    let json: Value = match serde_json::from_str(payload) {
        Ok(json) => json,
        Err(e) => {
            debug!("Skipping malformed stream chunk: {}", e);
            return None;
        }
    };

    let fragment = json["choices"]
        .as_array()
        .and_then(|choices| choices.first())
        .and_then(|choice| match choice.get("delta") {
            Some(delta) => delta["content"].as_str(),
            None => choice["text"].as_str(),
        })
        .map(str::to_string);
    let completion_tokens = json["usage"]["completion_tokens"].as_u64();

    if fragment.is_none() && completion_tokens.is_none() {
        return None;
    }

    Some(SseRecord::Chunk(StreamChunk {
        fragment,
        completion_tokens,
    }))
}

/// Splits a byte stream into lines, carrying partial lines between chunks.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Returns whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string())
    }
}

/// Turns reported token counts into a rate.
#[derive(Debug, Clone, Copy)]
pub struct StreamStats {
    started: Instant,
}

impl StreamStats {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn tokens_per_second(&self, completion_tokens: u64) -> Option<f32> {
        let elapsed = self.started.elapsed().as_secs_f32();
        (elapsed > 0.0).then(|| completion_tokens as f32 / elapsed)
    }
}

/// Emits the events carried by one line. Returns `false` once `[DONE]` is seen.
fn dispatch_line<F>(line: &str, stats: &StreamStats, on_event: &mut F) -> bool
where
    F: FnMut(StreamEvent),
{
    match parse_sse_line(line) {
        Some(SseRecord::Done) => {
            on_event(StreamEvent::Done);
            false
        }
        Some(SseRecord::Chunk(chunk)) => {
            if let Some(fragment) = chunk.fragment {
                on_event(StreamEvent::Fragment(fragment));
            }
            if let Some(rate) = chunk
                .completion_tokens
                .and_then(|tokens| stats.tokens_per_second(tokens))
            {
                on_event(StreamEvent::TokenRate(rate));
            }
            true
        }
        None => true,
    }
}

/// Reads an SSE body line by line and hands every event to `on_event`.
///
/// Stops at `[DONE]` or when the body ends; a `Done` event is always the last
/// thing emitted. Transport errors end the read and are returned.
pub async fn read_event_stream<S, B, E, F>(
    body: S,
    stats: StreamStats,
    mut on_event: F,
) -> Result<(), InferenceError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<InferenceError>,
    F: FnMut(StreamEvent),
{
    futures::pin_mut!(body);
    let mut buffer = SseLineBuffer::new();

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(Into::into)?;
        for line in buffer.push(chunk.as_ref()) {
            if !dispatch_line(&line, &stats, &mut on_event) {
                return Ok(());
            }
        }
    }

    if let Some(line) = buffer.finish() {
        if !dispatch_line(&line, &stats, &mut on_event) {
            return Ok(());
        }
    }
    on_event(StreamEvent::Done);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(chunks: Vec<&'static str>) -> impl Stream<Item = Result<&'static [u8], InferenceError>> {
        stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes())))
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        read_event_stream(body(chunks), StreamStats::start(), |e| events.push(e))
            .await
            .unwrap();
        events
    }

    #[test]
    fn test_parse_delta_content() {
        let record = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(
            record,
            Some(SseRecord::Chunk(StreamChunk {
                fragment: Some("Hi".to_string()),
                completion_tokens: None,
            }))
        );
    }

    #[test]
    fn test_parse_ignores_empty_and_noise() {
        assert_eq!(parse_sse_line("data: "), None);
        assert_eq!(parse_sse_line("data:"), None);
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
        assert_eq!(parse_sse_line(r#"data: {"choices":[]}"#), None);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            None
        );
    }

    #[test]
    fn test_parse_text_completion_shape() {
        let record = parse_sse_line(r#"data: {"choices":[{"text":"Once"}]}"#);
        assert!(matches!(
            record,
            Some(SseRecord::Chunk(StreamChunk { fragment: Some(ref t), .. })) if t == "Once"
        ));
    }

    #[test]
    fn test_parse_done_and_usage() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseRecord::Done));
        let record = parse_sse_line(r#"data: {"choices":[],"usage":{"completion_tokens":42}}"#);
        assert_eq!(
            record,
            Some(SseRecord::Chunk(StreamChunk {
                fragment: None,
                completion_tokens: Some(42),
            }))
        );
    }

    #[test]
    fn test_line_buffer_reassembles_split_lines() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"choi").is_empty());
        let lines = buffer.push(b"ces\":[]}\r\n\ndata: x");
        assert_eq!(lines, vec!["data: {\"choices\":[]}".to_string(), String::new()]);
        assert_eq!(buffer.finish(), Some("data: x".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[tokio::test]
    async fn test_reader_forwards_fragments() {
        let events = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: \n",
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\" there\"}}]}\n",
        ])
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("Hi".to_string()),
                StreamEvent::Fragment(" there".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_reader_stops_at_done() {
        let events = collect(vec![
            "data: {\"choices\":[{\"text\":\"a\"}]}\n",
            "data: [DONE]\n",
            "data: {\"choices\":[{\"text\":\"late\"}]}\n",
        ])
        .await;

        assert_eq!(
            events,
            vec![StreamEvent::Fragment("a".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_reader_handles_unterminated_last_line() {
        let events = collect(vec!["data: {\"choices\":[{\"text\":\"end\"}]}"]).await;
        assert_eq!(
            events,
            vec![StreamEvent::Fragment("end".to_string()), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_reader_propagates_transport_error() {
        let chunks: Vec<Result<&'static [u8], InferenceError>> = vec![
            Ok(b"data: {\"choices\":[{\"text\":\"a\"}]}\n"),
            Err(InferenceError::api_error(0, "connection reset")),
            Ok(b"data: {\"choices\":[{\"text\":\"b\"}]}\n"),
        ];
        let mut events = Vec::new();
        let result = read_event_stream(stream::iter(chunks), StreamStats::start(), |e| {
            events.push(e)
        })
        .await;

        assert!(result.is_err());
        assert_eq!(events, vec![StreamEvent::Fragment("a".to_string())]);
    }
}
