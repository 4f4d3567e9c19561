//! External collaborators of the session recorder.
//!
//! - Screen capture ([`capture::ScreenCapture`])
//! - Image/text embedding ([`embedder::Embedder`]), with a CLIP backend
//!   behind the `clip` feature
//! - Active-window lookup ([`window::ActiveWindow`])
//!
//! The default backends shell out to platform tools (`screencapture`,
//! `osascript`, `import`, `xdotool`) and never block longer than their
//! configured timeout.

pub mod capture;
#[cfg(feature = "clip")]
pub mod clip;
pub mod embedder;
pub mod window;

pub use capture::{encode_jpeg, CaptureError, CommandCapture, ScreenCapture};
#[cfg(feature = "clip")]
pub use clip::ClipEmbedder;
pub use embedder::{EmbedError, Embedder, SketchEmbedder};
pub use window::{ActiveWindow, FixedWindow, FrontmostWindow, UNKNOWN_WINDOW};

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Run `cmd` to completion, killing it after `timeout`.
///
/// Output is drained while waiting, so a chatty command cannot stall on a
/// full pipe. Returns `Ok(None)` on timeout.
pub(crate) fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> io::Result<Option<Output>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match child.wait_timeout(timeout)? {
        Some(status) => Ok(Some(Output {
            status,
            stdout: collect(stdout),
            stderr: collect(stderr),
        })),
        None => {
            let _ = child.kill();
            let _ = child.wait();
            Ok(None)
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
