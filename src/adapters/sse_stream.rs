//! Server-Sent Events parsing for the agent runtime's streaming chat
//! endpoint. The wire format mirrors the common `event:`/`data:` framing:
//! `message_start`, `content_block_delta` (carries the text chunk), and
//! `message_stop`.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::domain::ports::{OrchestratorError, OrchestratorResult};

/// A single parsed SSE event: its `event:` name plus the `data:` payload,
/// already decoded as JSON.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

/// Parse one `\n\n`-delimited SSE frame.
pub fn parse_sse_event(text: &str) -> OrchestratorResult<SseEvent> {
    let mut event_type: Option<String> = None;
    let mut data_line: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(':') {
            continue;
        }
        if let Some(v) = trimmed.strip_prefix("event:") {
            event_type = Some(v.trim().to_string());
        } else if let Some(v) = trimmed.strip_prefix("data:") {
            data_line = Some(v.trim().to_string());
        }
    }

    let data_str = data_line.ok_or_else(|| OrchestratorError::Upstream("SSE event missing 'data:' field".to_string()))?;
    let data: serde_json::Value = serde_json::from_str(&data_str)
        .map_err(|e| OrchestratorError::Upstream(format!("failed to parse SSE data as JSON: {e}")))?;
    let event_type = event_type
        .or_else(|| data.get("type").and_then(|v| v.as_str()).map(str::to_string))
        .ok_or_else(|| OrchestratorError::Upstream("SSE event missing 'event:'/'type' field".to_string()))?;
    Ok(SseEvent { event_type, data })
}

/// Wraps a raw byte stream (e.g. `reqwest::Response::bytes_stream()`) and
/// yields parsed `SseEvent`s as complete frames arrive.
pub struct SseEventStream {
    inner: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
}

impl SseEventStream {
    pub fn new(byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: String::new(),
        }
    }
}

impl Stream for SseEventStream {
    type Item = OrchestratorResult<SseEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event_end) = self.buffer.find("\n\n") {
                let event_text = self.buffer[..event_end].to_string();
                self.buffer.drain(..event_end + 2);
                if event_text.trim().is_empty() {
                    continue;
                }
                return Poll::Ready(Some(parse_sse_event(&event_text)));
            }

            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.buffer.push_str(text),
                    Err(e) => {
                        return Poll::Ready(Some(Err(OrchestratorError::Upstream(format!(
                            "invalid utf-8 in chat stream: {e}"
                        )))))
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(OrchestratorError::Upstream(format!("chat stream error: {e}")))));
                }
                Poll::Ready(None) => {
                    if !self.buffer.trim().is_empty() {
                        let remaining = std::mem::take(&mut self.buffer);
                        return Poll::Ready(Some(parse_sse_event(&remaining)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data() {
        let text = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hi\"}}";
        let event = parse_sse_event(text).unwrap();
        assert_eq!(event.event_type, "content_block_delta");
        assert_eq!(event.data["delta"]["text"], "hi");
    }

    #[test]
    fn falls_back_to_type_field_when_event_line_missing() {
        let text = "data: {\"type\":\"message_stop\"}";
        let event = parse_sse_event(text).unwrap();
        assert_eq!(event.event_type, "message_stop");
    }

    #[test]
    fn missing_data_errors() {
        let text = "event: content_block_delta";
        assert!(parse_sse_event(text).is_err());
    }
}
