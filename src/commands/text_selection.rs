use tauri::{AppHandle, Manager, WebviewWindow};

use crate::actions::TextActionRequest;
use crate::managers::text_selection::{TextSelectionState, TextSelectionStatus};
use crate::overlay::session_id_from_label;
use crate::settings::{get_settings, AppSettings};

fn state(app: &AppHandle) -> Result<tauri::State<'_, TextSelectionState>, String> {
    app.try_state::<TextSelectionState>().ok_or_else(|| {
        "Text selection state not found. App may not be initialized properly.".to_string()
    })
}

pub fn start_with_settings(app: &AppHandle, settings: &AppSettings) -> Result<(), String> {
    state(app)?.manager.start(settings)
}

pub fn stop(app: &AppHandle) -> Result<(), String> {
    state(app)?.manager.stop();
    Ok(())
}

pub fn apply_settings(app: &AppHandle, settings: &AppSettings) {
    if let Ok(state) = state(app) {
        state.manager.apply_settings(settings);
    }
}

/// Start watching for the copy gesture
#[tauri::command]
#[specta::specta]
pub fn text_selection_start(app_handle: AppHandle) -> Result<(), String> {
    let settings = get_settings(&app_handle);
    start_with_settings(&app_handle, &settings)
}

/// Stop watching and close any open overlay
#[tauri::command]
#[specta::specta]
pub fn text_selection_stop(app_handle: AppHandle) -> Result<(), String> {
    stop(&app_handle)
}

#[tauri::command]
#[specta::specta]
pub fn get_text_selection_status(app_handle: AppHandle) -> Result<TextSelectionStatus, String> {
    Ok(state(&app_handle)?.manager.status())
}

/// Called by the overlay page when the user picks an action.
#[tauri::command]
#[specta::specta]
pub fn submit_text_action(
    app_handle: AppHandle,
    window: WebviewWindow,
    request: TextActionRequest,
) -> Result<(), String> {
    let session = session_id_from_label(window.label());
    state(&app_handle)?.manager.submit_action(request, session)
}

#[tauri::command]
#[specta::specta]
pub fn show_main_window(app_handle: AppHandle) -> Result<(), String> {
    crate::actions::show_main_window(&app_handle)
}
