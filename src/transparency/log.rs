//! Collection transparency log.
//!
//! Counts what the logger observed and stored so a user can audit it with
//! `screen-logger status`. Counters only, never content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Counters of everything the logger observed and wrote.
#[derive(Debug)]
pub struct TransparencyLog {
    keyboard_events: AtomicU64,
    pointer_events: AtomicU64,
    sessions_persisted: AtomicU64,
    /// Duplicate-key writes dropped by the store
    sessions_ignored: AtomicU64,
    /// Clicks that did not change the screen
    clicks_discarded: AtomicU64,
    /// Events whose handling failed at some stage
    failures: AtomicU64,
    /// Events dropped by a full merge queue
    queue_drops: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            keyboard_events: AtomicU64::new(0),
            pointer_events: AtomicU64::new(0),
            sessions_persisted: AtomicU64::new(0),
            sessions_ignored: AtomicU64::new(0),
            clicks_discarded: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            queue_drops: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that loads and saves its totals at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    /// Record a keyboard event.
    pub fn record_keyboard_event(&self) {
        self.keyboard_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pointer click.
    pub fn record_pointer_event(&self) {
        self.pointer_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session written to the store.
    pub fn record_session_persisted(&self) {
        self.sessions_persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session the store already had.
    pub fn record_session_ignored(&self) {
        self.sessions_ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a click that did not change the screen.
    pub fn record_click_discarded(&self) {
        self.clicks_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed event.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Queue drops are counted by the queue; this adds the delta since the last sync.
    pub fn record_queue_drops(&self, count: u64) {
        self.queue_drops.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            keyboard_events: self.keyboard_events.load(Ordering::Relaxed),
            pointer_events: self.pointer_events.load(Ordering::Relaxed),
            sessions_persisted: self.sessions_persisted.load(Ordering::Relaxed),
            sessions_ignored: self.sessions_ignored.load(Ordering::Relaxed),
            clicks_discarded: self.clicks_discarded.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            queue_drops: self.queue_drops.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Collection Statistics:\n\
             - Keyboard events processed: {}\n\
             - Pointer clicks processed: {}\n\
             - Sessions persisted: {}\n\
             - Duplicate sessions ignored: {}\n\
             - Clicks discarded (screen unchanged): {}\n\
             - Failed events: {}\n\
             - Events dropped (queue full): {}\n\
             - Run duration: {} seconds\n\
             \n\
             Stored Per Session:\n\
             - One screenshot and its embedding\n\
             - Active window title and inferred app/action labels\n\
             - Text typed between the opening and closing click",
            stats.keyboard_events,
            stats.pointer_events,
            stats.sessions_persisted,
            stats.sessions_ignored,
            stats.clicks_discarded,
            stats.failures,
            stats.queue_drops,
            stats.session_duration_secs
        )
    }

    /// Save totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                keyboard_events: stats.keyboard_events,
                pointer_events: stats.pointer_events,
                sessions_persisted: stats.sessions_persisted,
                sessions_ignored: stats.sessions_ignored,
                clicks_discarded: stats.clicks_discarded,
                failures: stats.failures,
                queue_drops: stats.queue_drops,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.keyboard_events
                    .store(persisted.keyboard_events, Ordering::Relaxed);
                self.pointer_events
                    .store(persisted.pointer_events, Ordering::Relaxed);
                self.sessions_persisted
                    .store(persisted.sessions_persisted, Ordering::Relaxed);
                self.sessions_ignored
                    .store(persisted.sessions_ignored, Ordering::Relaxed);
                self.clicks_discarded
                    .store(persisted.clicks_discarded, Ordering::Relaxed);
                self.failures.store(persisted.failures, Ordering::Relaxed);
                self.queue_drops
                    .store(persisted.queue_drops, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.keyboard_events,
            &self.pointer_events,
            &self.sessions_persisted,
            &self.sessions_ignored,
            &self.clicks_discarded,
            &self.failures,
            &self.queue_drops,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub keyboard_events: u64,
    pub pointer_events: u64,
    pub sessions_persisted: u64,
    pub sessions_ignored: u64,
    pub clicks_discarded: u64,
    pub failures: u64,
    pub queue_drops: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    keyboard_events: u64,
    pointer_events: u64,
    sessions_persisted: u64,
    #[serde(default)]
    sessions_ignored: u64,
    clicks_discarded: u64,
    failures: u64,
    queue_drops: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a shared log backed by `path`.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_keyboard_event();
        log.record_keyboard_event();
        log.record_pointer_event();
        log.record_click_discarded();
        log.record_queue_drops(3);

        let stats = log.stats();
        assert_eq!(stats.keyboard_events, 2);
        assert_eq!(stats.pointer_events, 1);
        assert_eq!(stats.clicks_discarded, 1);
        assert_eq!(stats.queue_drops, 3);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_session_persisted();
        log.record_failure();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.sessions_persisted, 0);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_session_persisted();
        log.record_session_persisted();
        log.record_failure();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.sessions_persisted, 2);
        assert_eq!(stats.failures, 1);
    }

    #[test]
    fn test_summary_format() {
        let summary = TransparencyLog::new().summary();

        assert!(summary.contains("Keyboard events"));
        assert!(summary.contains("Sessions persisted"));
        assert!(summary.contains("Text typed between"));
    }
}
