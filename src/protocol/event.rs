//! # Protocol Events
//!
//! [`Event`] is the untyped unit read from and written to the wire.
//! [`ClientEvent`] is the closed set of kinds the dispatcher understands;
//! anything else lands in [`ClientEvent::Other`] and is ignored.

use crate::audio::AudioFormat;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DESCRIBE_TYPE: &str = "describe";
pub const INFO_TYPE: &str = "info";
pub const TRANSCRIBE_TYPE: &str = "transcribe";
pub const TRANSCRIPT_TYPE: &str = "transcript";
pub const AUDIO_START_TYPE: &str = "audio-start";
pub const AUDIO_CHUNK_TYPE: &str = "audio-chunk";
pub const AUDIO_STOP_TYPE: &str = "audio-stop";

/// A decoded Wyoming event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    /// Event kind, e.g. `audio-chunk`
    pub event_type: String,

    /// Merged inline and out-of-band JSON data
    pub data: Map<String, Value>,

    /// Binary payload (PCM for audio chunks)
    pub payload: Option<Vec<u8>>,
}

impl Event {
    /// Create an event with no data and no payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Map::new(),
            payload: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    /// Deserialize the data block into a typed struct.
    fn parse_data<T: serde::de::DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Serialize a struct into an event data block.
pub(crate) fn to_data<T: Serialize>(value: &T) -> AppResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(AppError::Protocol(format!(
            "event data must be a JSON object, got {}",
            other
        ))),
    }
}

/// Data block of an `audio-chunk` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AudioChunkData {
    rate: u32,
    width: u16,
    channels: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
}

/// One chunk of raw PCM audio with its format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub format: AudioFormat,

    /// Milliseconds since the start of the stream, if the client sends it
    pub timestamp: Option<u64>,

    /// Interleaved little-endian samples
    pub audio: Vec<u8>,
}

impl AudioChunk {
    pub fn new(format: AudioFormat, audio: Vec<u8>) -> Self {
        Self {
            format,
            timestamp: None,
            audio,
        }
    }

    /// Parse an `audio-chunk` event, taking ownership of its payload.
    ///
    /// Missing or ill-typed `rate`/`width`/`channels` is an audio error: the
    /// chunk's metadata is corrupt and it cannot be normalized.
    pub fn from_event(event: Event) -> AppResult<Self> {
        let data: AudioChunkData = event
            .parse_data()
            .map_err(|e| AppError::Audio(format!("invalid audio-chunk metadata: {}", e)))?;

        Ok(Self {
            format: AudioFormat::new(data.rate, data.width, data.channels),
            timestamp: data.timestamp,
            audio: event.payload.unwrap_or_default(),
        })
    }

    pub fn into_event(self) -> AppResult<Event> {
        let data = to_data(&AudioChunkData {
            rate: self.format.rate,
            width: self.format.width,
            channels: self.format.channels,
            timestamp: self.timestamp,
        })?;
        Ok(Event::new(AUDIO_CHUNK_TYPE)
            .with_data(data)
            .with_payload(self.audio))
    }
}

/// Data block of a `transcribe` event. Both fields are hints only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcribe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Recognized text for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn into_event(self) -> AppResult<Event> {
        Ok(Event::new(TRANSCRIPT_TYPE).with_data(to_data(&self)?))
    }

    pub fn from_event(event: &Event) -> AppResult<Self> {
        event.parse_data()
    }
}

/// The event kinds the dispatcher routes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Capability query
    Describe,

    /// Client intends to stream audio for transcription
    Transcribe(Transcribe),

    /// Raw audio to accumulate
    AudioChunk(AudioChunk),

    /// End of the utterance
    AudioStop,

    /// Any other kind, including `audio-start`; kept for logging
    Other(String),
}

impl TryFrom<Event> for ClientEvent {
    type Error = AppError;

    fn try_from(event: Event) -> AppResult<Self> {
        match event.event_type.as_str() {
            DESCRIBE_TYPE => Ok(ClientEvent::Describe),
            // Hints are optional; unreadable ones are dropped rather than failing the stream
            TRANSCRIBE_TYPE => Ok(ClientEvent::Transcribe(
                event.parse_data().unwrap_or_default(),
            )),
            AUDIO_CHUNK_TYPE => Ok(ClientEvent::AudioChunk(AudioChunk::from_event(event)?)),
            AUDIO_STOP_TYPE => Ok(ClientEvent::AudioStop),
            _ => Ok(ClientEvent::Other(event.event_type)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_audio_chunk_parsing_takes_payload() {
        let event = Event::new(AUDIO_CHUNK_TYPE)
            .with_data(data(json!({"rate": 22050, "width": 2, "channels": 2, "timestamp": 40})))
            .with_payload(vec![1, 2, 3, 4]);

        match ClientEvent::try_from(event).unwrap() {
            ClientEvent::AudioChunk(chunk) => {
                assert_eq!(chunk.format, AudioFormat::new(22050, 2, 2));
                assert_eq!(chunk.timestamp, Some(40));
                assert_eq!(chunk.audio, vec![1, 2, 3, 4]);
            }
            other => panic!("Wrong event kind: {:?}", other),
        }
    }

    #[test]
    fn test_audio_chunk_without_format_is_audio_error() {
        let event = Event::new(AUDIO_CHUNK_TYPE)
            .with_data(data(json!({"rate": 16000})))
            .with_payload(vec![0, 0]);

        let err = ClientEvent::try_from(event).unwrap_err();
        assert!(matches!(err, AppError::Audio(_)));
    }

    #[test]
    fn test_unknown_and_audio_start_are_other() {
        let start = Event::new(AUDIO_START_TYPE)
            .with_data(data(json!({"rate": 16000, "width": 2, "channels": 1})));
        assert_eq!(
            ClientEvent::try_from(start).unwrap(),
            ClientEvent::Other(AUDIO_START_TYPE.to_string())
        );
        assert_eq!(
            ClientEvent::try_from(Event::new("run-pipeline")).unwrap(),
            ClientEvent::Other("run-pipeline".to_string())
        );
    }

    #[test]
    fn test_transcribe_hints_are_optional() {
        let bare = ClientEvent::try_from(Event::new(TRANSCRIBE_TYPE)).unwrap();
        assert_eq!(bare, ClientEvent::Transcribe(Transcribe::default()));

        let garbage = Event::new(TRANSCRIBE_TYPE).with_data(data(json!({"language": 7})));
        assert_eq!(
            ClientEvent::try_from(garbage).unwrap(),
            ClientEvent::Transcribe(Transcribe::default())
        );

        let hinted = Event::new(TRANSCRIBE_TYPE).with_data(data(json!({"language": "de"})));
        match ClientEvent::try_from(hinted).unwrap() {
            ClientEvent::Transcribe(t) => assert_eq!(t.language.as_deref(), Some("de")),
            other => panic!("Wrong event kind: {:?}", other),
        }
    }

    #[test]
    fn test_transcript_event_shape() {
        let event = Transcript::new("turn on the lights").into_event().unwrap();
        assert!(event.is_type(TRANSCRIPT_TYPE));
        assert_eq!(event.data.get("text"), Some(&json!("turn on the lights")));
        assert!(event.payload.is_none());
    }
}
