//! Typed-text reconstruction from raw key identifiers.

use crate::collector::types::{
    KEY_BACKSPACE, KEY_DELETE, KEY_ENTER, KEY_SPACE, KEY_TAB, NAMED_KEY_PREFIX,
};
use std::collections::VecDeque;

/// Fold an ordered key sequence into the text it produced.
///
/// Backspace/delete remove the last character, enter appends a newline,
/// space and tab append their whitespace, other `Key.*` names contribute
/// nothing and anything else is appended verbatim.
pub fn reconstruct<S: AsRef<str>>(keys: &[S]) -> String {
    let mut buf = String::new();

    for key in keys {
        let key = key.as_ref();
        match key {
            KEY_BACKSPACE | KEY_DELETE => {
                buf.pop();
            }
            KEY_ENTER => buf.push('\n'),
            KEY_SPACE => buf.push(' '),
            KEY_TAB => buf.push('\t'),
            _ if key.starts_with(NAMED_KEY_PREFIX) => {}
            _ => buf.push_str(key),
        }
    }

    buf
}

/// Keystroke buffer for the open session.
///
/// With a maximum size set, the oldest key is evicted once the buffer is
/// full and the buffer remembers that it was truncated.
#[derive(Debug, Clone)]
pub struct KeyBuffer {
    keys: VecDeque<String>,
    max_keys: Option<usize>,
    evicted: usize,
}

impl KeyBuffer {
    pub fn new(max_keys: Option<usize>) -> Self {
        Self {
            keys: VecDeque::new(),
            max_keys,
            evicted: 0,
        }
    }

    pub fn push(&mut self, key: impl Into<String>) {
        if let Some(max) = self.max_keys {
            if max == 0 {
                self.evicted += 1;
                return;
            }
            while self.keys.len() >= max {
                self.keys.pop_front();
                self.evicted += 1;
            }
        }
        self.keys.push_back(key.into());
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.evicted = 0;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys evicted since the last clear.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    pub fn is_truncated(&self) -> bool {
        self.evicted > 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    /// Reconstructed text of the buffered keys.
    pub fn text(&self) -> String {
        let keys: Vec<&str> = self.keys().collect();
        reconstruct(&keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sequence() {
        let empty: [&str; 0] = [];
        assert_eq!(reconstruct(&empty), "");
    }

    #[test]
    fn test_backspace_removes_last_char() {
        assert_eq!(reconstruct(&["a", "b", "Key.backspace"]), "a");
        assert_eq!(reconstruct(&["Key.backspace", "a"]), "a");
        assert_eq!(reconstruct(&["a", "Key.delete", "Key.delete"]), "");
    }

    #[test]
    fn test_enter_appends_newline() {
        assert_eq!(reconstruct(&["a", "Key.enter", "b"]), "a\nb");
    }

    #[test]
    fn test_control_keys_only() {
        assert_eq!(
            reconstruct(&["Key.shift", "Key.ctrl", "Key.cmd", "Key.esc", "Key.up"]),
            ""
        );
    }

    #[test]
    fn test_whitespace_keys() {
        assert_eq!(reconstruct(&["h", "Key.space", "i", "Key.tab"]), "h i\t");
    }

    #[test]
    fn test_backspace_over_newline() {
        assert_eq!(reconstruct(&["a", "Key.enter", "Key.backspace", "b"]), "ab");
    }

    #[test]
    fn test_key_buffer_unbounded() {
        let mut buffer = KeyBuffer::new(None);
        for key in ["h", "i", "Key.enter"] {
            buffer.push(key);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.text(), "hi\n");
        assert!(!buffer.is_truncated());
    }

    #[test]
    fn test_key_buffer_evicts_oldest() {
        let mut buffer = KeyBuffer::new(Some(3));
        for key in ["a", "b", "c", "d", "e"] {
            buffer.push(key);
        }
        assert_eq!(buffer.keys().collect::<Vec<_>>(), vec!["c", "d", "e"]);
        assert_eq!(buffer.evicted(), 2);
        assert_eq!(buffer.text(), "cde");

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(!buffer.is_truncated());
    }

    #[test]
    fn test_key_buffer_backspace_after_eviction() {
        let mut buffer = KeyBuffer::new(Some(4));
        for key in ["x", "a", "b", "c", "Key.backspace", "Key.backspace", "d"] {
            buffer.push(key);
        }
        // Retained: c, backspace, backspace, d
        assert_eq!(buffer.text(), "d");
        assert!(buffer.is_truncated());
    }
}
