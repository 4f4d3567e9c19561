//! Screen Session Logger - click-bracketed screen activity history.
//!
//! Every meaningful screen change between two pointer clicks becomes one
//! stored session: a screenshot, its embedding, an inferred
//! (application, action) label pair, and the text typed in between.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Screen Session Logger                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐     │
//! │  │  Collector  │──▶│ Event Merge │──▶│ Session Recorder │     │
//! │  │ (ptr + key) │   │    Queue    │   │ (state machine)  │     │
//! │  └─────────────┘   └─────────────┘   └──────────────────┘     │
//! │                                        │      │       │       │
//! │                                        ▼      ▼       ▼       │
//! │                              ┌─────────┐ ┌──────────┐ ┌─────┐ │
//! │                              │ Capture │ │Classifier│ │Store│ │
//! │                              │ + Embed │ │ (labels) │ │(SQL)│ │
//! │                              └─────────┘ └──────────┘ └─────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use screen_session_logger::{
//!     core::{Classifier, LabelConfig, LabelTable, RecorderSettings, SessionRecorder},
//!     sensing::{CommandCapture, FrontmostWindow, SketchEmbedder},
//!     store::{DuplicatePolicy, SqliteStore},
//! };
//! use std::path::{Path, PathBuf};
//! use std::time::Duration;
//!
//! let embedder = SketchEmbedder::default();
//! let labels = LabelConfig::load(Path::new("labels.json")).unwrap();
//! let table = LabelTable::build(&labels, &embedder).unwrap();
//!
//! let mut recorder = SessionRecorder::new(
//!     Box::new(CommandCapture::new(PathBuf::from("/tmp/capture.png"), Duration::from_secs(5))),
//!     Box::new(embedder),
//!     Box::new(FrontmostWindow::default()),
//!     Classifier::new(table),
//!     SqliteStore::open("screen_log.db", DuplicatePolicy::Ignore).unwrap(),
//!     RecorderSettings::default(),
//! );
//! // Feed recorder.handle(&event) from the merge queue.
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod driver;
pub mod queue;
pub mod sensing;
pub mod store;
pub mod transparency;

pub use collector::{Collector, CollectorConfig, CollectorError, InputEvent};
pub use config::{Config, EmbedderBackend, SourceConfig};
pub use core::{Classifier, Outcome, RecorderError, Session, SessionRecorder};
pub use queue::{EventQueue, EventSink};
pub use store::{DuplicatePolicy, SessionStore, SqliteStore};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the logger records, shown by `screen-logger notice`.
pub const CAPTURE_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║             SCREEN SESSION LOGGER - CAPTURE NOTICE               ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This logger keeps a local history of your screen activity.      ║
║                                                                  ║
║  ✓ WHAT IS RECORDED, PER SESSION (click to click):               ║
║    • A full-screen screenshot (JPEG) at the opening click        ║
║    • A numeric embedding of that screenshot                      ║
║    • The active window title                                     ║
║    • Inferred application and action labels                      ║
║    • The text you typed, including passwords, until the          ║
║      next click that changes the screen                          ║
║                                                                  ║
║  ✗ WHAT IS NEVER DONE:                                           ║
║    • Nothing leaves this machine                                 ║
║    • Clicks that do not change the screen store nothing          ║
║                                                                  ║
║  Data lives in a single SQLite file. Pause anytime with:         ║
║    screen-logger pause                                           ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
