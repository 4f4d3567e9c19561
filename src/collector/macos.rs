//! macOS producers using a CGEvent tap.
//!
//! Key presses and mouse-button presses are observed at the session level
//! and forwarded to the merge queue. Requires Input Monitoring permission.

use crate::collector::keymap::key_identifier;
use crate::collector::types::{InputEvent, KeyEvent, PointerButton, PointerEvent};
use crate::collector::{CollectorConfig, CollectorError};
use crate::queue::EventSink;
use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
use core_graphics::display::CGDisplay;
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, CallbackResult, EventField,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Runs the event tap on a dedicated thread.
pub struct MacOSCollector {
    config: CollectorConfig,
    sink: EventSink,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MacOSCollector {
    pub fn new(config: CollectorConfig, sink: EventSink) -> Self {
        Self {
            config,
            sink,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
        }
    }

    /// Start the tap thread.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        if !check_permission() {
            return Err(CollectorError::PermissionDenied);
        }

        self.running.store(true, Ordering::SeqCst);

        let sink = self.sink.clone();
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            if let Err(e) = run_event_loop(sink, running.clone(), config) {
                error!(error = %e, "event tap stopped");
            }
            running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for MacOSCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_event_types(config: &CollectorConfig) -> Vec<CGEventType> {
    let mut types = Vec::new();
    if config.capture_keyboard {
        types.push(CGEventType::KeyDown);
    }
    if config.capture_pointer {
        types.push(CGEventType::LeftMouseDown);
        types.push(CGEventType::RightMouseDown);
        types.push(CGEventType::OtherMouseDown);
    }
    types
}

fn run_event_loop(
    sink: EventSink,
    running: Arc<AtomicBool>,
    config: CollectorConfig,
) -> Result<(), CollectorError> {
    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        build_event_types(&config),
        move |_proxy, event_type, event: &CGEvent| {
            if let Some(input) = translate(event_type, event) {
                if !sink.push(input) {
                    debug!("merge queue full, event dropped");
                }
            }
            // Listen-only: the event continues unchanged.
            CallbackResult::Keep
        },
    )
    .map_err(|_| CollectorError::TapCreationFailed)?;

    let source = tap
        .mach_port()
        .create_runloop_source(0)
        .map_err(|_| CollectorError::RunLoopSourceFailed)?;

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();

    while running.load(Ordering::SeqCst) {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopCommonModes },
            std::time::Duration::from_millis(100),
            false,
        );
    }

    Ok(())
}

fn translate(event_type: CGEventType, event: &CGEvent) -> Option<InputEvent> {
    match event_type {
        CGEventType::KeyDown => {
            let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
            let shift = event.get_flags().contains(CGEventFlags::CGEventFlagShift);
            key_identifier(keycode, shift).map(|key| InputEvent::Keyboard(KeyEvent::new(key)))
        }
        CGEventType::LeftMouseDown => Some(click(PointerButton::Left, event)),
        CGEventType::RightMouseDown => Some(click(PointerButton::Right, event)),
        CGEventType::OtherMouseDown => Some(click(PointerButton::Other, event)),
        _ => None,
    }
}

/// Click locations are global points; fractions are taken against the main display.
fn click(button: PointerButton, event: &CGEvent) -> InputEvent {
    let location = event.location();
    let bounds = CGDisplay::main().bounds();
    InputEvent::Pointer(
        PointerEvent::click(button, Some((location.x, location.y)))
            .with_screen_size(bounds.size.width, bounds.size.height),
    )
}

/// Whether an event tap can be created, i.e. Input Monitoring is granted.
pub fn check_permission() -> bool {
    CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![CGEventType::KeyDown],
        |_proxy, _type, _event| CallbackResult::Keep,
    )
    .is_ok()
}
