//! Input producers.
//!
//! A collector observes global pointer and keyboard activity and pushes
//! [`InputEvent`]s into the merge queue through an [`EventSink`]. Producers
//! share nothing else and never block.

pub mod keymap;
pub mod types;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(not(target_os = "macos"))]
pub mod noop;

pub use types::{InputEvent, KeyEvent, PointerButton, PointerEvent};

#[cfg(target_os = "macos")]
pub use macos::{check_permission, MacOSCollector};

/// Platform-agnostic collector type alias
#[cfg(target_os = "macos")]
pub type Collector = MacOSCollector;

#[cfg(not(target_os = "macos"))]
pub use noop::{check_permission, NoopCollector};

/// Platform-agnostic collector type alias
#[cfg(not(target_os = "macos"))]
pub type Collector = NoopCollector;

use thiserror::Error;

/// Which producers to run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub capture_keyboard: bool,
    pub capture_pointer: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            capture_keyboard: true,
            capture_pointer: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector is already running")]
    AlreadyRunning,
    #[error("input monitoring permission not granted")]
    PermissionDenied,
    #[error("failed to create event tap")]
    TapCreationFailed,
    #[error("failed to create run loop source")]
    RunLoopSourceFailed,
}
