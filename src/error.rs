use std::fmt;

/// Failures inside the text-selection pipeline. Every variant is recovered
/// locally: it is logged and the pipeline carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The OS-level keyboard hook could not be installed.
    HookInstall(String),
    /// Reading the system clipboard failed.
    ClipboardRead(String),
    /// The overlay window could not be created.
    WindowCreate(String),
    /// The overlay page loaded but could not receive its text or be shown.
    WindowLoad(String),
    /// The main window (or the browser opener) was unavailable.
    Relay(String),
}

impl PipelineError {
    pub fn reason(&self) -> &str {
        match self {
            PipelineError::HookInstall(reason)
            | PipelineError::ClipboardRead(reason)
            | PipelineError::WindowCreate(reason)
            | PipelineError::WindowLoad(reason)
            | PipelineError::Relay(reason) => reason,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineError::HookInstall(_) => "Keyboard hook unavailable",
            PipelineError::ClipboardRead(_) => "Clipboard read failed",
            PipelineError::WindowCreate(_) => "Overlay window creation failed",
            PipelineError::WindowLoad(_) => "Overlay window failed to load",
            PipelineError::Relay(_) => "Text action relay failed",
        };
        write!(f, "{}: {}", label, self.reason())
    }
}

impl std::error::Error for PipelineError {}
