//! Transparency about what the logger collects.

pub mod log;

pub use log::{
    create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog, TransparencyStats,
};
