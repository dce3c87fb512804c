//! # Wyoming Protocol
//!
//! Events exchanged with Wyoming clients (Home Assistant, satellites, ...).
//! Every event is a JSON header line, optionally followed by a JSON data
//! block and a binary payload.
//!
//! ## Client → Server:
//! - **describe**: Ask for the capability payload
//! - **transcribe**: Announce that audio for transcription follows
//! - **audio-chunk**: Raw PCM with its format in the data block
//! - **audio-stop**: End of the utterance
//!
//! ## Server → Client:
//! - **info**: Capability payload
//! - **transcript**: Recognized text

pub mod codec;    // Header/data/payload framing
pub mod event;    // Generic event plus typed client/server events
pub mod info;     // Capability payload (programs, models, languages)

pub use event::{AudioChunk, ClientEvent, Event, Transcript};
pub use info::Info;
