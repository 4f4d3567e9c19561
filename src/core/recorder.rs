//! The session state machine.
//!
//! A [`SessionRecorder`] consumes the merged event stream one event at a
//! time. Pointer clicks capture and embed the screen. The first click opens
//! a session. Later clicks either get discarded, when the screen did not
//! visibly change, or close the open session and open the next one.
//! Keystrokes are buffered while a session is open.
//!
//! Closing a session classifies the capture taken when it was *opened*, so
//! the typed text and the action label describe the same screen state.

use crate::collector::types::{InputEvent, KeyEvent, PointerEvent};
use crate::core::change::{ChangeDetector, DEFAULT_DISTANCE_THRESHOLD};
use crate::core::classifier::{ClassifyError, Classifier};
use crate::core::embedding::Embedding;
use crate::core::keystrokes::KeyBuffer;
use crate::core::session::{ClickPoint, Session};
use crate::sensing::{
    encode_jpeg, ActiveWindow, CaptureError, EmbedError, Embedder, ScreenCapture,
};
use crate::store::{InsertOutcome, SessionStore, StoreError};
use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

/// JPEG quality used for stored screenshots unless configured otherwise.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// A failure while handling one event. The recorder stays usable.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("screen capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error("persisting session failed: {0}")]
    Store(#[from] StoreError),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// What handling an event did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A session was opened with no session open before.
    Opened { session_start_ts: i64 },
    /// The click did not change the screen and was dropped.
    Unchanged { click_ts: i64 },
    /// The open session was written and a new one opened at `opened_ts`.
    Finalized {
        session_start_ts: i64,
        stored: InsertOutcome,
        opened_ts: i64,
    },
    /// The key was added to the open session's buffer.
    KeyBuffered,
    /// No session was open to attribute the key to.
    KeyIgnored,
}

/// Recorder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// No session open.
    Idle,
    /// A session is open and keystrokes are buffered.
    Recording,
}

/// Recorder tuning.
#[derive(Debug, Clone, Copy)]
pub struct RecorderSettings {
    /// Minimum embedding distance for a click to count as a screen change
    pub distance_threshold: f32,
    /// JPEG quality of stored screenshots
    pub jpeg_quality: u8,
    /// `None` keeps every keystroke of a session.
    pub max_buffered_keys: Option<usize>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_buffered_keys: Some(10_000),
        }
    }
}

/// The capture that opened the current session.
struct OpenCapture {
    ts: i64,
    screenshot: Vec<u8>,
    embedding: Embedding,
    window_title: String,
    click: Option<ClickPoint>,
}

/// Owns all session state. Driven by a single consumer.
pub struct SessionRecorder<S> {
    capture: Box<dyn ScreenCapture>,
    embedder: Box<dyn Embedder>,
    window: Box<dyn ActiveWindow>,
    classifier: Classifier,
    store: S,
    detector: ChangeDetector,
    jpeg_quality: u8,
    keys: KeyBuffer,
    open: Option<OpenCapture>,
}

impl<S: SessionStore> SessionRecorder<S> {
    /// Create an idle recorder.
    pub fn new(
        capture: Box<dyn ScreenCapture>,
        embedder: Box<dyn Embedder>,
        window: Box<dyn ActiveWindow>,
        classifier: Classifier,
        store: S,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            capture,
            embedder,
            window,
            classifier,
            store,
            detector: ChangeDetector::new(settings.distance_threshold),
            jpeg_quality: settings.jpeg_quality,
            keys: KeyBuffer::new(settings.max_buffered_keys),
            open: None,
        }
    }

    /// Whether a session is open.
    pub fn state(&self) -> RecorderState {
        if self.open.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Start timestamp of the open session.
    pub fn open_session_ts(&self) -> Option<i64> {
        self.open.as_ref().map(|open| open.ts)
    }

    /// Keystrokes buffered for the open session.
    pub fn buffered_keys(&self) -> usize {
        self.keys.len()
    }

    /// The store sessions are written to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consume the recorder, dropping any open session, and return its store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Dispatch one event.
    pub fn handle(&mut self, event: &InputEvent) -> Result<Outcome, RecorderError> {
        match event {
            InputEvent::Pointer(pointer) => self.on_pointer(pointer),
            InputEvent::Keyboard(key) => self.on_key(key),
        }
    }

    /// Handle a click.
    ///
    /// Capture or embedding failures leave the open session untouched; the
    /// next click retries. A failure while classifying or persisting loses
    /// the session being closed, and the new capture stays open.
    pub fn on_pointer(&mut self, event: &PointerEvent) -> Result<Outcome, RecorderError> {
        let ts = event.timestamp_ms;
        if let Some(open) = &self.open {
            if ts <= open.ts {
                return Err(RecorderError::MalformedEvent(format!(
                    "click at {ts} does not follow session start {}",
                    open.ts
                )));
            }
        }

        let image = self.capture.capture()?;
        let embedding = self.embedder.embed_image(&image)?;

        let changed = match &self.open {
            Some(open) => self
                .detector
                .is_changed(&open.embedding, &embedding)
                .map_err(EmbedError::from)?,
            None => true,
        };
        if !changed {
            debug!(ts, "screen unchanged, click discarded");
            return Ok(Outcome::Unchanged { click_ts: ts });
        }

        let next = self.open_capture(event, &image, embedding)?;
        match self.open.replace(next) {
            Some(previous) => self.finalize(previous, ts),
            None => {
                self.keys.clear();
                debug!(ts, "session opened");
                Ok(Outcome::Opened {
                    session_start_ts: ts,
                })
            }
        }
    }

    /// Handle a key press. Keys arriving while idle are ignored.
    pub fn on_key(&mut self, event: &KeyEvent) -> Result<Outcome, RecorderError> {
        if event.key.is_empty() {
            return Err(RecorderError::MalformedEvent(format!(
                "empty key identifier at {}",
                event.timestamp_ms
            )));
        }
        if self.open.is_none() {
            return Ok(Outcome::KeyIgnored);
        }
        self.keys.push(event.key.as_str());
        Ok(Outcome::KeyBuffered)
    }

    /// Drop the open session and its keystrokes without persisting.
    ///
    /// Returns the start timestamp of the dropped session.
    pub fn reset(&mut self) -> Option<i64> {
        self.keys.clear();
        self.open.take().map(|open| open.ts)
    }

    fn open_capture(
        &mut self,
        event: &PointerEvent,
        image: &RgbImage,
        embedding: Embedding,
    ) -> Result<OpenCapture, RecorderError> {
        let screenshot = encode_jpeg(image, self.jpeg_quality)?;
        // Without a reported screen size, the capture's pixel size stands in.
        let (width, height) = event
            .screen_size
            .unwrap_or((image.width() as f64, image.height() as f64));
        Ok(OpenCapture {
            ts: event.timestamp_ms,
            screenshot,
            embedding,
            window_title: self.window.active_title(),
            click: event
                .position
                .map(|position| ClickPoint::within(position, width, height)),
        })
    }

    fn finalize(
        &mut self,
        previous: OpenCapture,
        closed_at: i64,
    ) -> Result<Outcome, RecorderError> {
        let text = self.keys.text();
        let truncated = self.keys.is_truncated();
        self.keys.clear();

        let visual = self.classifier.classify_visual(&previous.embedding)?;
        let mut key_summary = self.classifier.classify_text(&text, &*self.embedder)?;
        key_summary.truncated = truncated;

        let session = Session {
            session_start_ts: previous.ts,
            ended_ts: closed_at,
            screenshot: previous.screenshot,
            embedding: previous.embedding,
            window_title: previous.window_title,
            click: previous.click,
            app_label: visual.app,
            action_label: visual.action,
            confidence: visual.confidence,
            key_summary,
        };
        let stored = self.store.insert_session(&session)?;

        info!(
            ts = session.session_start_ts,
            app = %session.app_label,
            action = %session.action_label,
            chars = session.key_summary.plain_text.chars().count(),
            ?stored,
            "session finalized"
        );

        Ok(Outcome::Finalized {
            session_start_ts: session.session_start_ts,
            stored,
            opened_ts: closed_at,
        })
    }
}
