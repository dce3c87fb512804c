//! # Event Framing
//!
//! Reads and writes Wyoming events on any tokio byte stream.
//!
//! ## Wire format:
//! ```text
//! {"type": "audio-chunk", "version": "1.5.4", "data_length": 42, "payload_length": 3200}\n
//! <42 bytes of JSON object, merged over the header's inline "data">
//! <3200 bytes of payload>
//! ```
//! `data`, `data_length` and `payload_length` are all optional.

use crate::error::{AppError, AppResult};
use crate::protocol::event::Event;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Protocol version advertised in every header we write.
pub const PROTOCOL_VERSION: &str = "1.5.4";

/// Longest accepted header line, newline included.
pub const MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Longest accepted out-of-band data block.
pub const MAX_DATA_BYTES: usize = 1024 * 1024;

/// Largest accepted payload (about 8 minutes of canonical audio).
pub const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct EventHeader {
    #[serde(rename = "type")]
    event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    data_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload_length: Option<usize>,
}

/// Read the next event.
///
/// ## Returns:
/// - **Ok(Some(event))**: One complete event
/// - **Ok(None)**: Clean end of stream at an event boundary
/// - **Err(AppError::Io)**: Stream ended inside an event
/// - **Err(AppError::Protocol)**: A length limit was exceeded
///
/// Header lines that are not valid JSON are skipped with a warning.
pub async fn read_event<R>(reader: &mut R) -> AppResult<Option<Event>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    let header = loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_HEADER_BYTES as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            if read >= MAX_HEADER_BYTES {
                return Err(AppError::Protocol(format!(
                    "event header exceeds {} bytes",
                    MAX_HEADER_BYTES
                )));
            }
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }

        let trimmed = trim_line(&line);
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_slice::<EventHeader>(trimmed) {
            Ok(header) => break header,
            Err(err) => {
                warn!(error = %err, "Skipping malformed event header");
            }
        }
    };

    let mut data = header.data.unwrap_or_default();

    if let Some(length) = header.data_length.filter(|&n| n > 0) {
        check_limit("data", length, MAX_DATA_BYTES)?;
        let mut block = vec![0u8; length];
        reader.read_exact(&mut block).await?;
        let extra: Map<String, Value> = serde_json::from_slice(&block)?;
        data.extend(extra);
    }

    let payload = match header.payload_length.filter(|&n| n > 0) {
        Some(length) => {
            check_limit("payload", length, MAX_PAYLOAD_BYTES)?;
            let mut payload = vec![0u8; length];
            reader.read_exact(&mut payload).await?;
            Some(payload)
        }
        None => None,
    };

    Ok(Some(Event {
        event_type: header.event_type,
        data,
        payload,
    }))
}

/// Write one event and flush it.
///
/// Data always travels out of band (`data_length`) so the header line stays
/// short regardless of payload size.
pub async fn write_event<W>(writer: &mut W, event: &Event) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_event(event)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Serialize an event into its exact wire bytes.
pub fn encode_event(event: &Event) -> AppResult<Vec<u8>> {
    let data_block = if event.data.is_empty() {
        None
    } else {
        Some(serde_json::to_vec(&event.data)?)
    };
    let payload = event.payload.as_deref().filter(|p| !p.is_empty());

    let header = EventHeader {
        event_type: event.event_type.clone(),
        version: Some(PROTOCOL_VERSION.to_string()),
        data: None,
        data_length: data_block.as_ref().map(Vec::len),
        payload_length: payload.map(<[u8]>::len),
    };

    let mut bytes = serde_json::to_vec(&header)?;
    bytes.push(b'\n');
    if let Some(block) = &data_block {
        bytes.extend_from_slice(block);
    }
    if let Some(payload) = payload {
        bytes.extend_from_slice(payload);
    }
    Ok(bytes)
}

fn check_limit(what: &str, length: usize, limit: usize) -> AppResult<()> {
    if length > limit {
        return Err(AppError::Protocol(format!(
            "{} length {} exceeds limit of {} bytes",
            what, length, limit
        )));
    }
    Ok(())
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r' | b' ' | b'\t') {
        end -= 1;
    }
    &line[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    async fn read_all(bytes: &[u8]) -> Vec<AppResult<Option<Event>>> {
        let mut reader = BufReader::new(bytes);
        let mut out = Vec::new();
        loop {
            let next = read_event(&mut reader).await;
            let stop = !matches!(next, Ok(Some(_)));
            out.push(next);
            if stop {
                break;
            }
        }
        out
    }

    #[tokio::test]
    async fn test_written_event_reads_back() {
        let mut data = Map::new();
        data.insert("rate".to_string(), json!(16000));
        let event = Event::new("audio-chunk")
            .with_data(data)
            .with_payload(vec![9u8; 320]);

        let mut wire = Vec::new();
        write_event(&mut wire, &event).await.unwrap();

        let mut reader = BufReader::new(wire.as_slice());
        let decoded = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, event);
        assert!(read_event(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_data_block_merges_over_inline_data() {
        let block = br#"{"width":2,"rate":22050}"#;
        let header = format!(
            "{{\"type\":\"audio-chunk\",\"data\":{{\"rate\":16000,\"channels\":1}},\"data_length\":{},\"payload_length\":2}}\n",
            block.len()
        );
        let mut wire = header.into_bytes();
        wire.extend_from_slice(block);
        wire.extend_from_slice(&[1, 2]);

        let mut reader = BufReader::new(wire.as_slice());
        let event = read_event(&mut reader).await.unwrap().unwrap();
        assert_eq!(event.data.get("rate"), Some(&json!(22050)));
        assert_eq!(event.data.get("channels"), Some(&json!(1)));
        assert_eq!(event.data.get("width"), Some(&json!(2)));
        assert_eq!(event.payload, Some(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_malformed_header_is_skipped() {
        let wire = b"this is not json\n{\"type\":\"describe\"}\n";
        let results = read_all(wire).await;
        assert_eq!(results.len(), 2);
        match &results[0] {
            Ok(Some(event)) => assert!(event.is_type("describe")),
            other => panic!("Unexpected result: {:?}", other),
        }
        assert!(matches!(results[1], Ok(None)));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let wire = b"{\"type\":\"audio-chunk\",\"payload_length\":10}\n\x00\x01";
        let mut reader = BufReader::new(&wire[..]);
        let err = read_event(&mut reader).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected() {
        let wire = format!(
            "{{\"type\":\"audio-chunk\",\"payload_length\":{}}}\n",
            MAX_PAYLOAD_BYTES + 1
        );
        let mut reader = BufReader::new(wire.as_bytes());
        let err = read_event(&mut reader).await.unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut data = Map::new();
        data.insert("text".to_string(), json!("hello"));
        let event = Event::new("transcript").with_data(data);

        let first = encode_event(&event).unwrap();
        let second = encode_event(&event.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(br#"{"text":"hello"}"#));
    }
}
