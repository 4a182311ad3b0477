use crate::key_classifier::{KeyKind, KeyTable};
use log::warn;
use serde::{Deserialize, Serialize};
use specta::Type;
use std::collections::HashMap;
use tauri::AppHandle;
use tauri_plugin_store::StoreExt;

pub const SETTINGS_STORE_PATH: &str = "settings_store.json";
const SETTINGS_KEY: &str = "settings";

pub const DEFAULT_SEARCH_URL_TEMPLATE: &str = "https://www.google.com/search?q={query}";

const MAX_CAPTURE_DELAY_MS: u64 = 2_000;
const MAX_CAPTURE_RETRY_WINDOW_MS: u64 = 5_000;
const MIN_OVERLAY_EDGE: f64 = 120.0;
const MAX_OVERLAY_EDGE: f64 = 4_000.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Type)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Type)]
#[serde(default)]
pub struct AppSettings {
    pub text_selection_enabled: bool,
    pub capture_delay_ms: u64,
    /// `0` keeps the single read after `capture_delay_ms`.
    pub capture_retry_window_ms: u64,
    pub capture_poll_interval_ms: u64,
    pub overlay_width: f64,
    pub overlay_height: f64,
    pub overlay_offset_x: f64,
    pub overlay_offset_y: f64,
    /// Browser URL for the search action; `{query}` is replaced by the
    /// percent-encoded selection.
    pub search_url_template: String,
    /// Extra key spellings, e.g. `{"Strg": {"kind": "ctrl"}}`.
    pub key_name_aliases: HashMap<String, KeyKind>,
    pub key_code_aliases: HashMap<u32, KeyKind>,
    pub log_level: LogLevel,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            text_selection_enabled: true,
            capture_delay_ms: 200,
            capture_retry_window_ms: 0,
            capture_poll_interval_ms: 50,
            overlay_width: 1600.0,
            overlay_height: 320.0,
            overlay_offset_x: 150.0,
            overlay_offset_y: 140.0,
            search_url_template: DEFAULT_SEARCH_URL_TEMPLATE.to_string(),
            key_name_aliases: HashMap::new(),
            key_code_aliases: HashMap::new(),
            log_level: LogLevel::Info,
        }
    }
}

impl AppSettings {
    /// Pulls out-of-range values back into something usable.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();

        self.capture_delay_ms = self.capture_delay_ms.min(MAX_CAPTURE_DELAY_MS);
        self.capture_retry_window_ms = self
            .capture_retry_window_ms
            .min(MAX_CAPTURE_RETRY_WINDOW_MS);
        self.capture_poll_interval_ms = self.capture_poll_interval_ms.clamp(10, 1_000);

        for (value, fallback) in [
            (&mut self.overlay_width, defaults.overlay_width),
            (&mut self.overlay_height, defaults.overlay_height),
        ] {
            *value = if value.is_finite() {
                value.clamp(MIN_OVERLAY_EDGE, MAX_OVERLAY_EDGE)
            } else {
                fallback
            };
        }
        for (value, fallback) in [
            (&mut self.overlay_offset_x, defaults.overlay_offset_x),
            (&mut self.overlay_offset_y, defaults.overlay_offset_y),
        ] {
            if !value.is_finite() {
                *value = fallback;
            }
        }

        if !is_valid_search_template(&self.search_url_template) {
            self.search_url_template = defaults.search_url_template;
        }
        self
    }

    /// Platform key table with the configured aliases applied.
    pub fn key_table(&self) -> KeyTable {
        let mut table = KeyTable::platform_default();
        for (name, kind) in &self.key_name_aliases {
            table.insert_name(name.clone(), *kind);
        }
        for (code, kind) in &self.key_code_aliases {
            table.insert_code(*code, *kind);
        }
        table
    }
}

pub fn is_valid_search_template(template: &str) -> bool {
    (template.starts_with("https://") || template.starts_with("http://"))
        && template.contains("{query}")
}

pub fn get_default_settings() -> AppSettings {
    AppSettings::default()
}

pub fn get_settings(app: &AppHandle) -> AppSettings {
    let store = match app.store(SETTINGS_STORE_PATH) {
        Ok(store) => store,
        Err(e) => {
            warn!("Failed to open settings store, using defaults: {}", e);
            return get_default_settings();
        }
    };

    match store.get(SETTINGS_KEY) {
        Some(value) => match serde_json::from_value::<AppSettings>(value) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                warn!("Failed to parse stored settings, using defaults: {}", e);
                get_default_settings()
            }
        },
        None => {
            let defaults = get_default_settings();
            write_settings(app, defaults.clone());
            defaults
        }
    }
}

pub fn write_settings(app: &AppHandle, settings: AppSettings) {
    let store = match app.store(SETTINGS_STORE_PATH) {
        Ok(store) => store,
        Err(e) => {
            warn!("Failed to open settings store: {}", e);
            return;
        }
    };

    match serde_json::to_value(&settings) {
        Ok(value) => store.set(SETTINGS_KEY, value),
        Err(e) => warn!("Failed to serialize settings: {}", e),
    }
}
