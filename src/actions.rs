use crate::error::PipelineError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use specta::Type;
use tauri::{AppHandle, Emitter, EventTarget, Manager};
use tauri_plugin_opener::OpenerExt;

pub const MAIN_WINDOW_LABEL: &str = "main";
pub const TEXT_ACTION_EVENT: &str = "text-action";

/// What the user picked in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
pub enum TextAction {
    Translate,
    Explain,
    Search,
    Speak,
}

impl TextAction {
    /// Dedicated main-window channel, `None` for actions handled outside it.
    pub fn channel(&self) -> Option<&'static str> {
        match self {
            TextAction::Translate => Some("translate-text"),
            TextAction::Explain => Some("explain-text"),
            TextAction::Speak => Some("speak-text"),
            TextAction::Search => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct TextActionRequest {
    pub action: TextAction,
    pub text: String,
}

pub trait MainWindowRelay: Send + Sync {
    fn deliver(&self, request: &TextActionRequest) -> Result<(), String>;
    /// Shows, unminimizes and focuses the main window.
    fn reveal(&self) -> Result<(), String>;
}

pub trait BrowserOpener: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), String>;
}

/// Addresses one webview window only; a plain `emit` reaches every window.
pub fn window_target(label: &str) -> EventTarget {
    EventTarget::webview_window(label)
}

/// Builds the browser URL for a search. `{query}` in `template` is replaced by
/// the percent-encoded text; a template without it gets the query appended.
pub fn build_search_url(template: &str, text: &str) -> String {
    let query = urlencoding::encode(text);
    if template.contains("{query}") {
        template.replace("{query}", &query)
    } else {
        format!("{}{}", template, query)
    }
}

/// Routes overlay requests to the main window or the default browser.
pub struct ActionRelay<M, B> {
    main_window: M,
    browser: B,
    search_url_template: String,
}

impl<M: MainWindowRelay, B: BrowserOpener> ActionRelay<M, B> {
    pub fn new(main_window: M, browser: B, search_url_template: impl Into<String>) -> Self {
        Self {
            main_window,
            browser,
            search_url_template: search_url_template.into(),
        }
    }

    pub fn set_search_url_template(&mut self, template: impl Into<String>) {
        self.search_url_template = template.into();
    }

    pub fn main_window(&self) -> &M {
        &self.main_window
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn dispatch(&self, request: &TextActionRequest) -> Result<(), PipelineError> {
        info!(
            "Dispatching {:?} ({} chars)",
            request.action,
            request.text.chars().count()
        );

        match request.action {
            TextAction::Search => {
                let url = build_search_url(&self.search_url_template, &request.text);
                debug!("Opening search URL: {}", url);
                self.browser.open_url(&url).map_err(PipelineError::Relay)
            }
            TextAction::Translate | TextAction::Explain | TextAction::Speak => {
                self.main_window
                    .deliver(request)
                    .map_err(PipelineError::Relay)?;
                self.main_window.reveal().map_err(PipelineError::Relay)
            }
        }
    }
}

/// The app's `main` webview window.
pub struct TauriMainWindow {
    app_handle: AppHandle,
}

impl TauriMainWindow {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }

    fn window(&self) -> Result<tauri::WebviewWindow, String> {
        self.app_handle
            .get_webview_window(MAIN_WINDOW_LABEL)
            .ok_or_else(|| "Main window not found".to_string())
    }
}

impl MainWindowRelay for TauriMainWindow {
    fn deliver(&self, request: &TextActionRequest) -> Result<(), String> {
        let window = self.window()?;
        let target = window_target(window.label());
        window
            .emit_to(target.clone(), TEXT_ACTION_EVENT, request)
            .map_err(|e| format!("Failed to emit {}: {}", TEXT_ACTION_EVENT, e))?;
        if let Some(channel) = request.action.channel() {
            window
                .emit_to(target, channel, &request.text)
                .map_err(|e| format!("Failed to emit {}: {}", channel, e))?;
        }
        Ok(())
    }

    fn reveal(&self) -> Result<(), String> {
        show_main_window(&self.app_handle)
    }
}

pub fn show_main_window(app_handle: &AppHandle) -> Result<(), String> {
    let window = app_handle
        .get_webview_window(MAIN_WINDOW_LABEL)
        .ok_or_else(|| "Main window not found".to_string())?;
    let _ = window.unminimize();
    window
        .show()
        .map_err(|e| format!("Failed to show main window: {}", e))?;
    window
        .set_focus()
        .map_err(|e| format!("Failed to focus main window: {}", e))
}

/// OS default browser via the opener plugin.
pub struct TauriBrowser {
    app_handle: AppHandle,
}

impl TauriBrowser {
    pub fn new(app_handle: AppHandle) -> Self {
        Self { app_handle }
    }
}

impl BrowserOpener for TauriBrowser {
    fn open_url(&self, url: &str) -> Result<(), String> {
        self.app_handle
            .opener()
            .open_url(url, None::<String>)
            .map_err(|e| format!("Failed to open browser: {}", e))
    }
}
