//! Decoding of newline-delimited watch responses.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use schedbench_core::Pod;

use crate::error::{ClientError, Status};
use crate::traits::{WatchEvent, WatchStream};

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    object: Value,
}

fn decode_pod(object: Value) -> Result<Pod, ClientError> {
    serde_json::from_value(object).map_err(|e| ClientError::Decode(format!("watch object: {e}")))
}

/// Decode one JSON watch line.
///
/// `ERROR` events carry a `Status` and are returned as errors.
pub fn decode_event_line(line: &[u8]) -> Result<WatchEvent, ClientError> {
    let raw: RawEvent = serde_json::from_slice(line)
        .map_err(|e| ClientError::Decode(format!("watch event: {e}")))?;

    match raw.event_type.as_str() {
        "ADDED" => Ok(WatchEvent::Added(decode_pod(raw.object)?)),
        "MODIFIED" => Ok(WatchEvent::Modified(decode_pod(raw.object)?)),
        "DELETED" => Ok(WatchEvent::Deleted(decode_pod(raw.object)?)),
        "BOOKMARK" => {
            let pod = decode_pod(raw.object)?;
            let resource_version = pod.metadata.resource_version.unwrap_or_default();
            Ok(WatchEvent::Bookmark { resource_version })
        }
        "ERROR" => {
            let status: Status = serde_json::from_value(raw.object).unwrap_or_default();
            let code = status.code.unwrap_or(500);
            Err(ClientError::from_status(code, status))
        }
        other => Err(ClientError::Decode(format!("unknown watch event type {other:?}"))),
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    &line[start..end]
}

/// Turn a chunked response body into a stream of watch events.
///
/// Chunks are split on newlines regardless of how the transport framed
/// them. The stream ends after the body ends or yields an error.
pub fn event_stream<S, E>(body: S) -> WatchStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<ClientError> + Send + 'static,
{
    let state = (Box::pin(body), BytesMut::new(), false);
    stream::unfold(state, |(mut body, mut buf, mut done)| async move {
        loop {
            if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line = buf.split_to(pos + 1);
                let line = trim_line(&line);
                if line.is_empty() {
                    continue;
                }
                let event = decode_event_line(line);
                return Some((event, (body, buf, done)));
            }

            if done {
                let rest = buf.split();
                let rest = trim_line(&rest);
                if rest.is_empty() {
                    return None;
                }
                let event = decode_event_line(rest);
                return Some((event, (body, buf, done)));
            }

            match body.next().await {
                Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    buf.clear();
                    done = true;
                    return Some((Err(e.into()), (body, buf, done)));
                }
                None => done = true,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<Bytes, ClientError>> + Send + 'static {
        let owned: Vec<Result<Bytes, ClientError>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        stream::iter(owned)
    }

    const ADDED: &str = r#"{"type":"ADDED","object":{"metadata":{"name":"a","namespace":"ns","resourceVersion":"5"}}}"#;

    #[test]
    fn test_decode_added() {
        let event = decode_event_line(ADDED.as_bytes()).unwrap();
        match &event {
            WatchEvent::Added(pod) => assert_eq!(pod.name(), "a"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.resource_version(), Some("5"));
    }

    #[test]
    fn test_decode_bookmark() {
        let line = r#"{"type":"BOOKMARK","object":{"kind":"Pod","metadata":{"resourceVersion":"77"}}}"#;
        let event = decode_event_line(line.as_bytes()).unwrap();
        assert_eq!(
            event,
            WatchEvent::Bookmark {
                resource_version: "77".into()
            }
        );
    }

    #[test]
    fn test_decode_error_event_gone() {
        let line = r#"{"type":"ERROR","object":{"kind":"Status","reason":"Expired","message":"too old","code":410}}"#;
        let err = decode_event_line(line.as_bytes()).unwrap_err();
        assert!(err.is_gone());
    }

    #[test]
    fn test_decode_unknown_type() {
        let line = r#"{"type":"WHATEVER","object":{}}"#;
        assert!(matches!(
            decode_event_line(line.as_bytes()),
            Err(ClientError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_lines() {
        let modified = ADDED.replace("ADDED", "MODIFIED");
        let (head, tail) = modified.split_at(20);
        let body = chunks(&[&format!("{ADDED}\n"), head, &format!("{tail}\n"), "\n"]);

        let events: Vec<_> = event_stream(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], Ok(WatchEvent::Added(_))));
        assert!(matches!(events[1], Ok(WatchEvent::Modified(_))));
    }

    #[tokio::test]
    async fn test_stream_flushes_trailing_line_without_newline() {
        let events: Vec<_> = event_stream(chunks(&[ADDED])).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }

    #[tokio::test]
    async fn test_stream_ends_after_transport_error() {
        let body = stream::iter(vec![
            Ok(Bytes::from(format!("{ADDED}\n"))),
            Err(ClientError::Decode("reset".into())),
            Ok(Bytes::from(format!("{ADDED}\n"))),
        ]);
        let events: Vec<_> = event_stream(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(events[1].is_err());
    }
}
