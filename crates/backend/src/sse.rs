//! SSE streaming infrastructure for the OpenAI-compatible adapter.
//!
//! The response body arrives in arbitrary chunks; complete events (blank-line
//! separated) are split off the front of a buffer and their `data:` payloads
//! fed to a parser that returns zero or more stream events.

use rants_domain::error::{Error, Result};
use rants_domain::stream::{BoxStream, StreamEvent};

/// Split complete SSE events off the front of `buffer` and return their
/// `data:` payloads, oldest first.
///
/// An event may carry `event:`, `id:`, or `retry:` lines next to its
/// `data:` lines; only the latter matter here. Bytes belonging to a
/// not-yet-complete event stay in the buffer for the next call.
pub(crate) fn take_data_payloads(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(end) = buffer.find("\n\n") {
        let event: String = buffer.drain(..end + 2).collect();
        payloads.extend(event.lines().filter_map(|line| {
            let value = line.trim().strip_prefix("data:")?.trim();
            (!value.is_empty()).then(|| value.to_string())
        }));
    }

    payloads
}

/// Build a [`BoxStream`] from an SSE `reqwest::Response` and a parser
/// closure.
///
/// The stream buffers incoming chunks and drains complete SSE events,
/// flushes the remaining buffer when the body closes, and emits a fallback
/// `Done` event if the parser never produced one.
pub(crate) fn sse_response_stream<F>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<StreamEvent>>
where
    F: FnMut(&str) -> Vec<Result<StreamEvent>> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();
        let mut done_emitted = false;

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));

                    for data in take_data_payloads(&mut buffer) {
                        for event in parse_data(&data) {
                            if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                done_emitted = true;
                            }
                            yield event;
                        }
                    }
                }
                Ok(None) => {
                    // Body closed -- flush any remaining partial event.
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in take_data_payloads(&mut buffer) {
                            for event in parse_data(&data) {
                                if matches!(&event, Ok(StreamEvent::Done { .. })) {
                                    done_emitted = true;
                                }
                                yield event;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(Error::Upstream {
                        status: e.status().map(|s| s.as_u16()),
                        message: format!("stream read failed: {e}"),
                    });
                    break;
                }
            }
        }

        if !done_emitted {
            yield Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            });
        }
    };

    Box::pin(stream)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_event_yields_its_payload() {
        let mut buf = String::from("event: message\ndata: {\"hello\":\"world\"}\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["{\"hello\":\"world\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn several_events_come_out_in_order() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_event_waits_for_more_bytes() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        assert_eq!(take_data_payloads(&mut buf), vec!["complete"]);
        assert_eq!(buf, "data: partial");

        buf.push_str(" rest\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["partial rest"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn non_data_lines_are_skipped() {
        let mut buf = String::from("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["payload"]);
    }

    #[test]
    fn empty_data_lines_are_skipped() {
        let mut buf = String::from("data: \n\ndata:\n\n");
        assert!(take_data_payloads(&mut buf).is_empty());
    }

    #[test]
    fn done_sentinel_passes_through_verbatim() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["[DONE]"]);
    }

    #[test]
    fn multi_data_event_yields_each_line() {
        let mut buf = String::from("data: one\ndata: two\n\n");
        assert_eq!(take_data_payloads(&mut buf), vec!["one", "two"]);
    }
}
