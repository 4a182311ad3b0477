pub mod text_selection;

use crate::settings::{
    get_settings, is_valid_search_template, write_settings, AppSettings, LogLevel,
};
use crate::utils::daily_log::LOG_DIR_NAME;
use std::path::PathBuf;
use tauri::{AppHandle, Manager};
use tauri_plugin_opener::OpenerExt;

#[tauri::command]
#[specta::specta]
pub fn get_app_settings(app: AppHandle) -> Result<AppSettings, String> {
    Ok(get_settings(&app))
}

#[tauri::command]
#[specta::specta]
pub fn get_default_settings() -> Result<AppSettings, String> {
    Ok(crate::settings::get_default_settings())
}

#[tauri::command]
#[specta::specta]
pub fn change_text_selection_enabled_setting(app: AppHandle, enabled: bool) -> Result<(), String> {
    let mut settings = get_settings(&app);
    settings.text_selection_enabled = enabled;
    write_settings(&app, settings.clone());

    if enabled {
        text_selection::start_with_settings(&app, &settings)
    } else {
        text_selection::stop(&app)
    }
}

#[tauri::command]
#[specta::specta]
pub fn change_capture_delay_setting(app: AppHandle, delay_ms: u64) -> Result<(), String> {
    let mut settings = get_settings(&app);
    settings.capture_delay_ms = delay_ms;
    let settings = settings.sanitized();
    write_settings(&app, settings.clone());
    text_selection::apply_settings(&app, &settings);
    Ok(())
}

#[tauri::command]
#[specta::specta]
pub fn change_search_url_template_setting(app: AppHandle, template: String) -> Result<(), String> {
    let template = template.trim().to_string();
    if !is_valid_search_template(&template) {
        return Err("Search URL must start with http(s):// and contain {query}".to_string());
    }

    let mut settings = get_settings(&app);
    settings.search_url_template = template;
    write_settings(&app, settings.clone());
    text_selection::apply_settings(&app, &settings);
    Ok(())
}

fn daily_log_dir(app: &AppHandle) -> Result<PathBuf, String> {
    let app_data_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| format!("Failed to get app data directory: {}", e))?;

    Ok(app_data_dir.join(LOG_DIR_NAME))
}

#[tauri::command]
#[specta::specta]
pub fn get_log_dir_path(app: AppHandle) -> Result<String, String> {
    let log_dir = daily_log_dir(&app)?;
    Ok(log_dir.to_string_lossy().to_string())
}

#[specta::specta]
#[tauri::command]
pub fn set_log_level(app: AppHandle, level: LogLevel) -> Result<(), String> {
    let log_level: log::LevelFilter = level.into();
    // Update the file log level atomic so the filter picks up the new level
    crate::FILE_LOG_LEVEL.store(log_level as u8, std::sync::atomic::Ordering::Relaxed);

    let mut settings = get_settings(&app);
    settings.log_level = level;
    write_settings(&app, settings);

    Ok(())
}

#[specta::specta]
#[tauri::command]
pub fn open_log_dir(app: AppHandle) -> Result<(), String> {
    let log_dir = daily_log_dir(&app)?;

    let path = log_dir.to_string_lossy().as_ref().to_string();
    app.opener()
        .open_path(path, None::<String>)
        .map_err(|e| format!("Failed to open log directory: {}", e))?;

    Ok(())
}
