//! # Connection Session
//!
//! Per-connection state for one Wyoming client. A session lives exactly as
//! long as its connection, is owned by that connection's task, and can run
//! any number of utterances back to back.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: No audio buffered (initial state, and after every `audio-stop`)
//! 2. **Receiving**: At least one chunk of the current utterance buffered

use crate::audio::{AudioNormalizer, UtteranceBuffer};
use crate::protocol::Event;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// The slice of server configuration a session depends on.
///
/// Built once in `main` and cloned into every connection.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Model id passed to the engine for every utterance
    pub model: Arc<str>,

    /// Precomputed `info` event returned for `describe`
    pub info: Arc<Event>,
}

/// Where the session is in the utterance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Receiving,
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Receiving => "receiving",
        }
    }
}

pub struct ConnectionSession {
    /// Correlates log lines of one connection
    pub id: Uuid,

    /// Fixed for the lifetime of the connection
    pub model: Arc<str>,

    /// Shared, never mutated
    pub info: Arc<Event>,

    /// Canonical audio of the current utterance
    pub buffer: UtteranceBuffer,

    /// Streaming conversion state of the current utterance
    pub normalizer: AudioNormalizer,

    pub created_at: DateTime<Utc>,

    /// Utterances completed on this connection, successful or not
    pub utterances: u64,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: config.model,
            info: config.info,
            buffer: UtteranceBuffer::new(),
            normalizer: AudioNormalizer::new(),
            created_at: Utc::now(),
            utterances: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.buffer.is_empty() {
            SessionStatus::Idle
        } else {
            SessionStatus::Receiving
        }
    }

    /// End the current utterance: hand over its audio and clear all
    /// per-utterance state.
    pub fn finish_utterance(&mut self) -> Vec<u8> {
        self.normalizer.reset();
        self.utterances += 1;
        self.buffer.take()
    }
}
