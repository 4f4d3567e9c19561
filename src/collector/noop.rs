//! Collector for platforms without a global input hook.
//!
//! Compiles everywhere without CoreGraphics. It produces no events; feed
//! the queue some other way (`screen-logger replay`) on these targets.

use crate::collector::{CollectorConfig, CollectorError};
use crate::queue::EventSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct NoopCollector {
    _config: CollectorConfig,
    _sink: EventSink,
    running: Arc<AtomicBool>,
}

impl NoopCollector {
    pub fn new(config: CollectorConfig, sink: EventSink) -> Self {
        Self {
            _config: config,
            _sink: sink,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Marks the collector as running.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        warn!("no input hook on this platform; no events will be collected");
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// There is no permission gate on these platforms.
pub fn check_permission() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::EventQueue;

    #[test]
    fn test_start_twice_fails() {
        let queue = EventQueue::new(None);
        let mut collector = NoopCollector::new(CollectorConfig::default(), queue.sink());
        collector.start().unwrap();
        assert!(collector.is_running());
        assert!(matches!(
            collector.start(),
            Err(CollectorError::AlreadyRunning)
        ));
        collector.stop();
        assert!(!collector.is_running());
        assert!(queue.is_empty());
    }
}
