//! Converts the upstream's raw SSE byte feed into a clean `StreamEvent`
//! sequence: one `ContentDelta` per parsed delta, exactly one terminal
//! `Done`, malformed lines swallowed rather than failing the stream.

use crate::types::events::StreamEvent;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

const DATA_PREFIX: &str = "data: ";
const DONE_TOKEN: &str = "[DONE]";

/// A line that never terminates is garbage, not a delta; cap how much of
/// it we are willing to hold before dropping it.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Accumulates raw bytes and yields only complete lines. An incomplete
/// trailing line is carried over and prefixed to the next chunk, so chunk
/// boundaries that split a `data: ` line — or fall inside a multibyte
/// UTF-8 character — are invisible to the parser. The buffer stays raw
/// bytes for exactly that reason: decoding happens per complete line.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            if self.discarding {
                // Tail of a line whose head was already dropped.
                self.discarding = false;
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        if self.buf.len() > MAX_LINE_BYTES {
            tracing::warn!(
                "discarding oversized stream line ({} bytes buffered without a newline)",
                self.buf.len()
            );
            self.buf.clear();
            self.discarding = true;
        }
        lines
    }
}

#[derive(Debug, PartialEq)]
enum Frame {
    Delta(String),
    Done,
    Skip,
}

/// Parse one line of the upstream feed. Lines without the `data: ` marker
/// are keep-alives or comments; payloads that fail to parse as JSON are
/// partial fragments the feed is allowed to produce. Both are skipped.
fn parse_line(line: &str) -> Frame {
    let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
        return Frame::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_TOKEN {
        return Frame::Done;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        tracing::debug!("discarding unparseable stream line: {}", payload);
        return Frame::Skip;
    };

    let choice = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    if let Some(text) = choice
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
    {
        return Frame::Delta(text.to_string());
    }
    if choice
        .and_then(|c| c.get("finish_reason"))
        .is_some_and(|f| !f.is_null())
    {
        return Frame::Done;
    }
    Frame::Skip
}

/// Relay an upstream byte feed as normalized events.
///
/// An I/O error after at least one delta terminates gracefully with `Done`,
/// preserving the partial output the user has already seen; an error before
/// any delta surfaces one `Error` event first. Upstream close without the
/// `[DONE]` sentinel also terminates with a synthetic `Done`, so consumers
/// never hang. Dropping the returned stream cancels the upstream read.
pub fn relay<S, E>(bytes: S) -> impl Stream<Item = StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        let mut lines = LineBuffer::new();
        let mut delivered = 0usize;
        let mut terminated = false;
        let mut bytes = std::pin::pin!(bytes);

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in lines.push(&chunk) {
                        match parse_line(&line) {
                            Frame::Delta(text) => {
                                delivered += 1;
                                yield StreamEvent::ContentDelta { text };
                            }
                            Frame::Done => {
                                terminated = true;
                                break;
                            }
                            Frame::Skip => {}
                        }
                    }
                }
                Err(err) => {
                    if delivered == 0 {
                        yield StreamEvent::error(format!("stream read failed: {err}"));
                    } else {
                        tracing::warn!(
                            "stream interrupted after {} deltas, keeping partial output: {}",
                            delivered,
                            err
                        );
                    }
                    terminated = true;
                }
            }
            if terminated {
                break;
            }
        }

        // Reached on the upstream terminator, on I/O error, and on upstream
        // close without a sentinel; every session ends with exactly one Done.
        yield StreamEvent::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn ok_chunks(chunks: &[&str]) -> Vec<Result<Bytes, io::Error>> {
        chunks
            .iter()
            .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
            .collect()
    }

    async fn collect(feed: Vec<Result<Bytes, io::Error>>) -> Vec<StreamEvent> {
        relay(stream::iter(feed)).collect().await
    }

    #[tokio::test]
    async fn test_two_deltas_then_done() {
        let events = collect(ok_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]))
        .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::delta("Hi"),
                StreamEvent::delta(" there"),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_chunk_boundary_invariance() {
        let feed = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let whole = collect(ok_chunks(&[feed])).await;

        // Re-deliver the identical feed split at a handful of awkward
        // places: mid-prefix, mid-JSON, right before the newline.
        for split in [3, 10, 25, feed.len() - 2] {
            let (a, b) = feed.split_at(split);
            let rechunked = collect(ok_chunks(&[a, b])).await;
            assert_eq!(rechunked, whole, "split at {}", split);
        }

        // Byte-at-a-time delivery.
        let bytes: Vec<&str> = (0..feed.len()).map(|i| &feed[i..=i]).collect();
        let trickled = collect(ok_chunks(&bytes)).await;
        assert_eq!(trickled, whole);
    }

    #[tokio::test]
    async fn test_chunk_boundary_inside_multibyte_character() {
        let feed = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"café ☕\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let whole = collect(ok_chunks(&[feed])).await;
        assert_eq!(whole[0], StreamEvent::delta("café ☕"));

        // Split at every byte offset, including the ones that land inside
        // the two-byte `é` and the three-byte `☕`.
        for split in 1..feed.len() {
            let (a, b) = feed.as_bytes().split_at(split);
            let rechunked = collect(vec![
                Ok(Bytes::copy_from_slice(a)),
                Ok(Bytes::copy_from_slice(b)),
            ])
            .await;
            assert_eq!(rechunked, whole, "split at byte {}", split);
        }
    }

    #[tokio::test]
    async fn test_malformed_lines_are_swallowed() {
        let events = collect(ok_chunks(&[
            ": keep-alive\n",
            "data: {truncated json\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "garbage without prefix\n",
            "data: [DONE]\n",
        ]))
        .await;

        assert_eq!(events, vec![StreamEvent::delta("ok"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_finish_reason_terminates() {
        let events = collect(ok_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"done soon\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n",
        ]))
        .await;

        assert_eq!(
            events,
            vec![StreamEvent::delta("done soon"), StreamEvent::Done]
        );
    }

    #[tokio::test]
    async fn test_error_before_any_delta_surfaces_error_then_done() {
        let feed: Vec<Result<Bytes, io::Error>> = vec![Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))];
        let events = collect(feed).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn test_error_after_partial_content_is_graceful() {
        let mut feed = ok_chunks(&["data: {\"choices\":[{\"delta\":{\"content\":\"part\"}}]}\n"]);
        feed.push(Err(io::Error::new(io::ErrorKind::BrokenPipe, "reset")));
        let events = collect(feed).await;

        assert_eq!(events, vec![StreamEvent::delta("part"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_upstream_close_without_sentinel_emits_done() {
        let events = collect(ok_chunks(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}\n",
        ]))
        .await;

        assert_eq!(events, vec![StreamEvent::delta("tail"), StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_nothing_after_the_terminator() {
        let events = collect(ok_chunks(&[
            "data: [DONE]\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ]))
        .await;

        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_exactly_one_terminal_event_on_garbage_feeds() {
        let feeds: Vec<Vec<&str>> = vec![
            vec!["data: \n"],
            vec!["dat", "a: [DO", "NE]\n"],
            vec!["data: {\"choices\":[{\"delta\":{\"content\":"],
            vec!["\n\n\n"],
            vec![""],
        ];
        for feed in feeds {
            let events = collect(ok_chunks(&feed)).await;
            let dones = events
                .iter()
                .filter(|e| **e == StreamEvent::Done)
                .count();
            assert_eq!(dones, 1);
            assert_eq!(*events.last().unwrap(), StreamEvent::Done);
        }
    }

    #[test]
    fn test_line_buffer_carries_partial_lines() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"par").is_empty());
        assert_eq!(buf.push(b"tial\"}\ndata: next"), vec!["data: {\"partial\"}"]);
        assert_eq!(buf.push(b"\n"), vec!["data: next"]);
    }

    #[test]
    fn test_line_buffer_strips_carriage_returns() {
        let mut buf = LineBuffer::new();
        assert_eq!(buf.push(b"data: [DONE]\r\n"), vec!["data: [DONE]"]);
    }

    #[test]
    fn test_line_buffer_drops_oversized_lines() {
        let mut buf = LineBuffer::new();
        let big = vec![b'x'; MAX_LINE_BYTES + 1];
        assert!(buf.push(&big).is_empty());
        // The rest of the runaway line is dropped up to its newline; the
        // following line comes through intact.
        assert_eq!(
            buf.push(b"yyy\ndata: [DONE]\n"),
            vec!["data: [DONE]"]
        );
    }

    #[test]
    fn test_parse_line_ignores_role_only_delta() {
        // The first OpenAI chunk typically carries only the role.
        assert_eq!(
            parse_line("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}"),
            Frame::Skip
        );
    }
}
