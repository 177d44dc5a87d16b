//! Append-only feedback event sink (§4.8).
//!
//! The spec marks persistence of the feedback log itself out of scope —
//! it's owned by the surrounding transport layer. This module defines the
//! trait seam (`FeedbackSink`) the adaptive ranker and offline analytics
//! read through, plus an in-memory default sufficient for both: a
//! `Vec`-backed log guarded by a single serializing lock, grounded on the
//! teacher's `RwLock`-guarded `recent_files: RwLock<RecentFilesCache>`
//! field in `service.rs` (one writer at a time, cheap reads) but using a
//! plain `Mutex` here since every access — `record` and `window` alike —
//! mutates or scans the same `Vec` rather than allowing concurrent readers.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FeedbackEvent;

/// Append-only sink for user feedback signals.
///
/// Implementations must never reorder or drop events once `record` returns
/// `Ok`. The surrounding transport layer may supply a persistent
/// implementation (file, database); this core only requires the trait.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    /// Append one event. Never mutates existing events.
    async fn record(&self, event: FeedbackEvent) -> Result<()>;

    /// All events with `timestamp >= since`, in insertion order.
    async fn window(&self, since: i64) -> Result<Vec<FeedbackEvent>>;

    /// Total number of events recorded so far.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory, process-local feedback log. Lost on restart; the transport
/// layer is expected to swap this for a durable sink in production, per
/// the trait seam documented in SPEC_FULL §4.8.
#[derive(Default)]
pub struct InMemoryFeedbackSink {
    events: Mutex<Vec<FeedbackEvent>>,
}

impl InMemoryFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedbackSink for InMemoryFeedbackSink {
    async fn record(&self, event: FeedbackEvent) -> Result<()> {
        let mut events = self.events.lock().map_err(|_| {
            crate::error::CoreError::internal("feedback log mutex poisoned")
        })?;
        events.push(event);
        Ok(())
    }

    async fn window(&self, since: i64) -> Result<Vec<FeedbackEvent>> {
        let events = self.events.lock().map_err(|_| {
            crate::error::CoreError::internal("feedback log mutex poisoned")
        })?;
        Ok(events.iter().filter(|e| e.timestamp >= since).cloned().collect())
    }

    async fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedbackKind;
    use crate::types::Intent;

    fn event(timestamp: i64) -> FeedbackEvent {
        FeedbackEvent {
            kind: FeedbackKind::Click,
            query_id: "q1".to_string(),
            result_id: "r1".to_string(),
            position: 0,
            dwell_ms: None,
            timestamp,
            intent: Intent::Debug,
        }
    }

    #[tokio::test]
    async fn record_then_window_returns_events_at_or_after_cutoff() {
        let sink = InMemoryFeedbackSink::new();
        sink.record(event(10)).await.unwrap();
        sink.record(event(20)).await.unwrap();
        sink.record(event(30)).await.unwrap();

        let window = sink.window(20).await.unwrap();
        assert_eq!(window.len(), 2);
        assert!(window.iter().all(|e| e.timestamp >= 20));
    }

    #[tokio::test]
    async fn events_preserve_insertion_order() {
        let sink = InMemoryFeedbackSink::new();
        for i in 0..5 {
            sink.record(event(i)).await.unwrap();
        }
        let window = sink.window(0).await.unwrap();
        let timestamps: Vec<i64> = window.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn len_tracks_recorded_events() {
        let sink = InMemoryFeedbackSink::new();
        assert!(sink.is_empty().await);
        sink.record(event(1)).await.unwrap();
        assert_eq!(sink.len().await, 1);
    }
}
