//! Best-effort active window lookup.

use crate::sensing::run_with_timeout;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Returned when the active window cannot be determined.
pub const UNKNOWN_WINDOW: &str = "UnknownWindow";

const FRONTMOST_SCRIPT: &str = "tell application \"System Events\" to get name of \
     first application process whose frontmost is true";

pub trait ActiveWindow: Send {
    /// Title of the focused window, or a placeholder. Never fails.
    fn active_title(&mut self) -> String;
}

/// Asks the platform for the frontmost window (`osascript` on macOS,
/// `xdotool` elsewhere).
#[derive(Debug, Clone)]
pub struct FrontmostWindow {
    timeout: Duration,
}

impl FrontmostWindow {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command() -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(FRONTMOST_SCRIPT);
            cmd
        } else {
            let mut cmd = Command::new("xdotool");
            cmd.args(["getwindowfocus", "getwindowname"]);
            cmd
        }
    }
}

impl Default for FrontmostWindow {
    fn default() -> Self {
        Self::new(Duration::from_millis(450))
    }
}

impl ActiveWindow for FrontmostWindow {
    fn active_title(&mut self) -> String {
        match run_with_timeout(&mut Self::command(), self.timeout) {
            Ok(Some(output)) if output.status.success() => {
                let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if title.is_empty() {
                    UNKNOWN_WINDOW.to_string()
                } else {
                    title
                }
            }
            Ok(Some(output)) => {
                debug!(status = %output.status, "window lookup failed");
                UNKNOWN_WINDOW.to_string()
            }
            Ok(None) => {
                debug!("window lookup timed out");
                UNKNOWN_WINDOW.to_string()
            }
            Err(e) => {
                debug!(error = %e, "window lookup unavailable");
                UNKNOWN_WINDOW.to_string()
            }
        }
    }
}

/// Always reports the same title.
#[derive(Debug, Clone)]
pub struct FixedWindow(pub String);

impl ActiveWindow for FixedWindow {
    fn active_title(&mut self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_window() {
        let mut window = FixedWindow("Terminal".into());
        assert_eq!(window.active_title(), "Terminal");
    }

    #[test]
    fn test_frontmost_never_empty() {
        // Whatever the host has installed, the lookup must degrade to a title.
        let mut window = FrontmostWindow::new(Duration::from_millis(200));
        assert!(!window.active_title().is_empty());
    }
}
