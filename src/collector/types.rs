//! Input event types shared by the producers and the session recorder.
//!
//! Keyboard events carry a raw key identifier in the `Key.<name>` convention
//! for named keys (`Key.enter`, `Key.backspace`, `Key.shift`, ...) and the
//! literal character for printable keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for the backspace key.
pub const KEY_BACKSPACE: &str = "Key.backspace";
/// Identifier for the forward-delete key.
pub const KEY_DELETE: &str = "Key.delete";
/// Identifier for the return key.
pub const KEY_ENTER: &str = "Key.enter";
/// Identifier for the space bar.
pub const KEY_SPACE: &str = "Key.space";
/// Identifier for the tab key.
pub const KEY_TAB: &str = "Key.tab";
/// Prefix shared by every named (non-literal) key identifier.
pub const NAMED_KEY_PREFIX: &str = "Key.";

/// A single key press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Raw key identifier
    pub key: String,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            key: key.into(),
        }
    }

    /// Create a key event with an explicit timestamp.
    pub fn at(timestamp_ms: i64, key: impl Into<String>) -> Self {
        Self {
            timestamp_ms,
            key: key.into(),
        }
    }
}

/// Pointer button classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerButton {
    Left,
    Right,
    Other,
}

/// A pointer button press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Which button went down
    pub button: PointerButton,
    /// Screen position, when the producer knows it
    pub position: Option<(f64, f64)>,
    /// Size of the screen `position` is measured on, in the same units
    #[serde(default)]
    pub screen_size: Option<(f64, f64)>,
}

impl PointerEvent {
    /// Create a click event stamped with the current time.
    pub fn click(button: PointerButton, position: Option<(f64, f64)>) -> Self {
        Self {
            timestamp_ms: Utc::now().timestamp_millis(),
            button,
            position,
            screen_size: None,
        }
    }

    /// Attach the size of the screen the position refers to.
    pub fn with_screen_size(mut self, width: f64, height: f64) -> Self {
        self.screen_size = Some((width, height));
        self
    }

    /// Create a left click with an explicit timestamp.
    pub fn left_at(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            button: PointerButton::Left,
            position: None,
            screen_size: None,
        }
    }
}

/// Unified event type flowing through the merge queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputEvent {
    Pointer(PointerEvent),
    Keyboard(KeyEvent),
}

impl InputEvent {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            InputEvent::Pointer(e) => e.timestamp_ms,
            InputEvent::Keyboard(e) => e.timestamp_ms,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_event_creation() {
        let event = KeyEvent::new("a");
        assert_eq!(event.key, "a");
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_event_timestamp() {
        let event = InputEvent::Pointer(PointerEvent::left_at(1_700_000_000_123));
        assert_eq!(event.timestamp_ms(), 1_700_000_000_123);
        assert_eq!(
            event.timestamp().map(|t| t.timestamp_millis()),
            Some(1_700_000_000_123)
        );
    }

    #[test]
    fn test_pointer_event_without_screen_size_parses() {
        let json = r#"{"kind":"pointer","timestamp_ms":7,"button":"left","position":[10.0,20.0]}"#;
        let event: InputEvent = serde_json::from_str(json).unwrap();
        match event {
            InputEvent::Pointer(pointer) => {
                assert_eq!(pointer.position, Some((10.0, 20.0)));
                assert_eq!(pointer.screen_size, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = InputEvent::Keyboard(KeyEvent::at(5, KEY_ENTER));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "keyboard");
        assert_eq!(json["key"], "Key.enter");
    }
}
