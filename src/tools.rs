//! Best-effort local tools. Currently: screen capture for vision turns.
//!
//! Capture shells out to a user-configured command (`grim`, `screencapture
//! -x -t jpg`, ...) that writes JPEG bytes to stdout. Failures are expected
//! and non-fatal — the caller proceeds without an attachment.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("screen capture is not configured")]
    Disabled,
    #[error("capture command failed: {0}")]
    Capture(String),
}

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Capture the screen as base64 JPEG.
    async fn capture_jpeg_base64(&self) -> Result<String, ToolError>;
}

/// Runs the configured command and base64-encodes its stdout.
pub struct CommandCapture {
    program: String,
    args: Vec<String>,
}

impl CommandCapture {
    /// Split a command line on whitespace. Returns `None` for an empty one.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture_jpeg_base64(&self) -> Result<String, ToolError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| ToolError::Capture(format!("failed to spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(ToolError::Capture(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(ToolError::Capture(format!(
                "{} produced no image data",
                self.program
            )));
        }
        Ok(BASE64.encode(&output.stdout))
    }
}

/// Stand-in when no capture command is configured.
pub struct CaptureDisabled;

#[async_trait]
impl ScreenCapture for CaptureDisabled {
    async fn capture_jpeg_base64(&self) -> Result<String, ToolError> {
        Err(ToolError::Disabled)
    }
}

/// Build the capture implementation from config.
pub fn capture_from_config(config: &crate::config::ToolsConfig) -> std::sync::Arc<dyn ScreenCapture> {
    match config
        .capture_command
        .as_deref()
        .and_then(CommandCapture::from_command_line)
    {
        Some(capture) => std::sync::Arc::new(capture),
        None => std::sync::Arc::new(CaptureDisabled),
    }
}
