//! The finalized session record.

use crate::core::classifier::Confidence;
use crate::core::embedding::Embedding;
use serde::{Deserialize, Serialize};

/// One ranked free-text label match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMatch {
    pub rank: usize,
    pub label: String,
    pub category: String,
    pub similarity: f32,
}

/// What the user typed during a session, and what it looks like.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeySummary {
    /// Reconstructed text
    pub plain_text: String,
    /// Highest-ranked free-text label, if any were scored
    pub best_label: Option<TextMatch>,
    /// Ranked label matches, best first
    pub top_k: Vec<TextMatch>,
    /// Whether the oldest keystrokes were evicted from a full buffer
    #[serde(default)]
    pub truncated: bool,
}

impl KeySummary {
    /// A summary carrying only the text.
    pub fn plain(text: &str) -> Self {
        Self {
            plain_text: text.to_string(),
            ..Self::default()
        }
    }
}

/// Where the opening click landed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickPoint {
    pub x: f64,
    pub y: f64,
    /// `x` as a fraction of the screen width
    pub x_perc: f64,
    /// `y` as a fraction of the screen height
    pub y_perc: f64,
}

impl ClickPoint {
    /// Locate `position` on a screen of `width` x `height`.
    pub fn within(position: (f64, f64), width: f64, height: f64) -> Self {
        let (x, y) = position;
        Self {
            x,
            y,
            x_perc: fraction(x, width),
            y_perc: fraction(y, height),
        }
    }
}

fn fraction(value: f64, extent: f64) -> f64 {
    if extent > 0.0 {
        value / extent
    } else {
        0.0
    }
}

/// A click-to-click session ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Timestamp (ms since epoch) of the click that opened the session; unique key
    pub session_start_ts: i64,
    /// Timestamp of the click that closed it
    pub ended_ts: i64,
    /// Compressed screenshot taken at the opening click
    #[serde(skip)]
    pub screenshot: Vec<u8>,
    /// Embedding of that screenshot
    pub embedding: Embedding,
    /// Active window title at the opening click
    pub window_title: String,
    /// Opening click position, when the producer reported one
    #[serde(default)]
    pub click: Option<ClickPoint>,
    pub app_label: String,
    pub action_label: String,
    pub confidence: Confidence,
    pub key_summary: KeySummary,
}

impl Session {
    /// Session length in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.ended_ts - self.session_start_ts
    }
}
