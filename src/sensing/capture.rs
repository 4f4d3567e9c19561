//! Full-screen capture.

use crate::sensing::run_with_timeout;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Placeholder replaced by the output path in capture command arguments.
pub const OUT_PLACEHOLDER: &str = "{out}";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture command is empty")]
    EmptyCommand,
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{program} did not finish within {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u128 },
    #[error("cannot decode capture: {0}")]
    Decode(#[from] image::ImageError),
}

/// Grabs the whole virtual screen as an RGB raster.
pub trait ScreenCapture: Send {
    fn capture(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Captures by running a screenshot tool that writes an image file.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    argv: Vec<String>,
    out_path: PathBuf,
    timeout: Duration,
}

impl CommandCapture {
    /// Use the platform's screenshot tool.
    pub fn new(out_path: PathBuf, timeout: Duration) -> Self {
        Self::with_command(Self::default_command(), out_path, timeout)
    }

    /// Use a custom command. `{out}` in any argument is replaced by the output path.
    pub fn with_command(argv: Vec<String>, out_path: PathBuf, timeout: Duration) -> Self {
        Self {
            argv,
            out_path,
            timeout,
        }
    }

    pub fn default_command() -> Vec<String> {
        let argv: &[&str] = if cfg!(target_os = "macos") {
            &["screencapture", "-x", "-t", "png", OUT_PLACEHOLDER]
        } else {
            &["import", "-window", "root", OUT_PLACEHOLDER]
        };
        argv.iter().map(|s| s.to_string()).collect()
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn resolved_args(&self) -> Vec<String> {
        let out = self.out_path.display().to_string();
        self.argv
            .iter()
            .skip(1)
            .map(|arg| arg.replace(OUT_PLACEHOLDER, &out))
            .collect()
    }
}

impl ScreenCapture for CommandCapture {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        let program = self.argv.first().ok_or(CaptureError::EmptyCommand)?.clone();

        if let Some(parent) = self.out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CaptureError::Spawn {
                program: program.clone(),
                source,
            })?;
        }

        let mut cmd = Command::new(&program);
        cmd.args(self.resolved_args());

        let output = run_with_timeout(&mut cmd, self.timeout)
            .map_err(|source| CaptureError::Spawn {
                program: program.clone(),
                source,
            })?
            .ok_or_else(|| CaptureError::Timeout {
                program: program.clone(),
                timeout_ms: self.timeout.as_millis(),
            })?;

        if !output.status.success() {
            return Err(CaptureError::Failed {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image = image::open(&self.out_path)?.to_rgb8();
        let _ = std::fs::remove_file(&self.out_path);
        debug!(width = image.width(), height = image.height(), "screen captured");
        Ok(image)
    }
}

/// Compress a capture to JPEG for storage.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let mut buf = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode_image(image)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_placeholder_substitution() {
        let capture = CommandCapture::with_command(
            vec!["shot".into(), "--file={out}".into(), "-q".into()],
            PathBuf::from("/tmp/x.png"),
            Duration::from_secs(1),
        );
        assert_eq!(capture.resolved_args(), vec!["--file=/tmp/x.png", "-q"]);
    }

    #[test]
    fn test_empty_command() {
        let mut capture =
            CommandCapture::with_command(vec![], PathBuf::from("x.png"), Duration::from_secs(1));
        assert!(matches!(capture.capture(), Err(CaptureError::EmptyCommand)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture = CommandCapture::with_command(
            vec!["definitely-not-a-screenshot-tool".into(), OUT_PLACEHOLDER.into()],
            dir.path().join("shot.png"),
            Duration::from_secs(1),
        );
        assert!(matches!(capture.capture(), Err(CaptureError::Spawn { .. })));
    }

    #[test]
    fn test_jpeg_encoding() {
        let img = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 128]));
        let jpeg = encode_jpeg(&img, 90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 16);
    }
}
