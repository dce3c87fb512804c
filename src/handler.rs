//! # Event Dispatcher
//!
//! Routes each inbound Wyoming event of one connection and decides whether
//! the current utterance cycle continues.
//!
//! ## Routing:
//! - **describe**: Reply with the cached `info` event
//! - **transcribe**: Acknowledge (nothing to do; audio is accepted without it)
//! - **audio-chunk**: Normalize and append to the utterance buffer
//! - **audio-stop**: Transcribe the buffer and reply with a `transcript`
//! - **anything else**: Ignore
//!
//! Events are handled strictly one at a time in arrival order. Errors are
//! returned to the connection loop, which closes the connection.

use crate::error::AppResult;
use crate::protocol::event::AUDIO_START_TYPE;
use crate::protocol::{AudioChunk, ClientEvent, Event, Transcript};
use crate::session::ConnectionSession;
use crate::transcription::{transcribe_utterance, SpeechEngine};
use std::sync::Arc;
use tracing::{debug, info};

/// What the connection loop should do after an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Event to write back to the client, if any
    pub reply: Option<Event>,

    /// `false` once an utterance has been answered
    pub keep_open: bool,
}

impl Outcome {
    fn proceed() -> Self {
        Self {
            reply: None,
            keep_open: true,
        }
    }

    fn reply(event: Event, keep_open: bool) -> Self {
        Self {
            reply: Some(event),
            keep_open,
        }
    }
}

/// Per-connection dispatcher. Owns the connection's session.
pub struct EventHandler {
    session: ConnectionSession,
    engine: Arc<dyn SpeechEngine>,
}

impl EventHandler {
    pub fn new(session: ConnectionSession, engine: Arc<dyn SpeechEngine>) -> Self {
        Self { session, engine }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Handle one event.
    ///
    /// ## Returns:
    /// - **Ok(outcome)**: Reply to send (if any) and whether the utterance continues
    /// - **Err(AppError)**: Bad audio, container or engine failure
    pub async fn handle_event(&mut self, event: Event) -> AppResult<Outcome> {
        match ClientEvent::try_from(event)? {
            ClientEvent::Describe => {
                debug!("Sending info");
                Ok(Outcome::reply((*self.session.info).clone(), true))
            }
            ClientEvent::Transcribe(request) => {
                debug!(
                    "Transcribe requested (name: {:?}, language: {:?})",
                    request.name, request.language
                );
                Ok(Outcome::proceed())
            }
            ClientEvent::AudioChunk(chunk) => {
                self.on_audio_chunk(chunk)?;
                Ok(Outcome::proceed())
            }
            ClientEvent::AudioStop => {
                let transcript = self.on_audio_stop().await?;
                Ok(Outcome::reply(transcript.into_event()?, false))
            }
            ClientEvent::Other(event_type) if event_type == AUDIO_START_TYPE => {
                debug!("Audio starting");
                Ok(Outcome::proceed())
            }
            ClientEvent::Other(event_type) => {
                debug!(status = self.session.status().as_str(), "Ignoring {} event", event_type);
                Ok(Outcome::proceed())
            }
        }
    }

    fn on_audio_chunk(&mut self, chunk: AudioChunk) -> AppResult<()> {
        // Checked before normalizing: a low source rate inflates the chunk
        self.session
            .buffer
            .check_room(chunk.format.canonical_len(chunk.audio.len()))?;

        let canonical = self.session.normalizer.normalize(&chunk.audio, chunk.format)?;
        if self.session.buffer.append(&canonical)? {
            debug!("Receiving audio ({})", chunk.format);
        }
        Ok(())
    }

    async fn on_audio_stop(&mut self) -> AppResult<Transcript> {
        let seconds = self.session.buffer.duration_seconds();
        let bytes = self.session.buffer.len();
        // Cleared before inference so a failure cannot leak audio into the
        // next utterance
        let pcm = self.session.finish_utterance();
        debug!("Audio stopped after {:.2}s ({} bytes), transcribing", seconds, bytes);

        let text = transcribe_utterance(
            Arc::clone(&self.engine),
            Arc::clone(&self.session.model),
            pcm,
        )
        .await?;

        info!(utterance = self.session.utterances, "Transcript ready");
        Ok(Transcript::new(text))
    }
}
