//! # Shared Server State
//!
//! Process-wide, read-mostly state shared by the connection tasks and the
//! HTTP health server.
//!
//! ## Concurrency:
//! - Counters are atomics; connection tasks bump them without locking
//! - Everything else is immutable after startup and shared through `Arc`
//! - Session data is never stored here; each session belongs to one task

use crate::protocol::Event;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Connection and utterance counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    utterances: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`] for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub utterances: u64,
    pub failures: u64,
}

impl ServerStats {
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturating: never wrap below zero
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn record_utterance(&self) {
        self.utterances.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection closed because of an error other than a disconnect.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            utterances: self.utterances.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// State handed to the HTTP health handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub stats: Arc<ServerStats>,

    /// Same capability event the Wyoming `describe` returns
    pub info: Arc<Event>,

    pub model: Arc<str>,

    /// Listen URI of the Wyoming server, for display
    pub uri: String,

    /// When the server started (never changes)
    pub start_time: Instant,
}

impl AppState {
    pub fn new(stats: Arc<ServerStats>, info: Arc<Event>, model: Arc<str>, uri: String) -> Self {
        Self {
            stats,
            info,
            model,
            uri,
            start_time: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
