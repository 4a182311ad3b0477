//! Clipboard access and selection capture.
//!
//! After a copy gesture the OS writes the clipboard asynchronously, so the
//! capture waits a short, tunable delay before reading and then filters out
//! blank and repeated selections.

use crate::error::PipelineError;
use crate::settings::AppSettings;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tauri::AppHandle;
use tauri_plugin_clipboard_manager::ClipboardExt;

pub trait ClipboardSource: Send + Sync {
    fn read_text(&self) -> Result<String, String>;
}

/// System clipboard through the clipboard-manager plugin.
pub struct TauriClipboard {
    app_handle: AppHandle,
}

impl TauriClipboard {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl ClipboardSource for TauriClipboard {
    fn read_text(&self) -> Result<String, String> {
        self.app_handle
            .clipboard()
            .read_text()
            .map_err(|e| format!("Failed to read clipboard: {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedSelection {
    pub text: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedSelection {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(CapturedSelection),
    Blank,
    Duplicate,
}

/// Timing of the post-copy clipboard read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePolicy {
    pub delay: Duration,
    /// Zero disables polling: one read after `delay`.
    pub retry_window: Duration,
    pub poll_interval: Duration,
}

impl CapturePolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            delay: Duration::from_millis(settings.capture_delay_ms),
            retry_window: Duration::from_millis(settings.capture_retry_window_ms),
            poll_interval: Duration::from_millis(settings.capture_poll_interval_ms.max(1)),
        }
    }
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(200),
            retry_window: Duration::ZERO,
            poll_interval: Duration::from_millis(50),
        }
    }
}

fn is_fresh(text: &str, last: Option<&str>) -> bool {
    !text.trim().is_empty() && last != Some(text)
}

/// Deduplicating filter in front of overlay presentation.
#[derive(Debug, Default)]
pub struct SelectionCapture {
    last_captured: Option<CapturedSelection>,
}

impl SelectionCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_text(&self) -> Option<&str> {
        self.last_captured.as_ref().map(|s| s.text.as_str())
    }

    /// Applies one clipboard read. A failed read leaves the last capture as is.
    pub fn accept(
        &mut self,
        read: Result<String, String>,
    ) -> Result<CaptureOutcome, PipelineError> {
        let text = read.map_err(PipelineError::ClipboardRead)?;

        debug!(
            "Clipboard read: len={} preview={:?}",
            text.chars().count(),
            preview(&text, 50)
        );

        if text.trim().is_empty() {
            return Ok(CaptureOutcome::Blank);
        }
        if !is_fresh(&text, self.last_text()) {
            return Ok(CaptureOutcome::Duplicate);
        }

        let selection = CapturedSelection::new(text);
        self.last_captured = Some(selection.clone());
        info!(
            "New selection captured ({} chars)",
            selection.text.chars().count()
        );
        Ok(CaptureOutcome::Captured(selection))
    }
}

/// Waits for the OS copy to land, then reads the clipboard.
///
/// With a non-zero retry window, stale reads (blank or equal to `last`) are
/// re-read until the window runs out; the final read is returned either way.
pub async fn read_after_copy(
    clipboard: Arc<dyn ClipboardSource>,
    policy: CapturePolicy,
    last: Option<String>,
) -> Result<String, String> {
    tokio::time::sleep(policy.delay).await;

    let started = Instant::now();
    loop {
        let read = clipboard.read_text();
        let stale = matches!(&read, Ok(text) if !is_fresh(text, last.as_deref()));
        if !stale || started.elapsed() >= policy.retry_window {
            return read;
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// First `max_chars` characters, for log lines.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
