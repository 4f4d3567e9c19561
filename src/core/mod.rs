//! Session segmentation and classification.
//!
//! This module contains:
//! - Embedding arithmetic and visual change detection
//! - Label tables and nearest-neighbour classification
//! - Keystroke reconstruction
//! - The session state machine tying them together

pub mod change;
pub mod classifier;
pub mod embedding;
pub mod keystrokes;
pub mod labels;
pub mod recorder;
pub mod session;

pub use change::ChangeDetector;
pub use classifier::{Classifier, ClassifyError, Confidence, VisualClassification};
pub use embedding::{Embedding, EmbeddingError, EMBEDDING_DIM};
pub use keystrokes::{reconstruct, KeyBuffer};
pub use labels::{LabelConfig, LabelError, LabelTable};
pub use recorder::{Outcome, RecorderError, RecorderSettings, RecorderState, SessionRecorder};
pub use session::{ClickPoint, KeySummary, Session, TextMatch};
