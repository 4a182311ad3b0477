mod actions;
mod clipboard;
mod commands;
mod error;
mod key_classifier;
mod managers;
mod overlay;
mod settings;
mod utils;

use actions::MAIN_WINDOW_LABEL;
use clipboard::TauriClipboard;
use managers::text_selection::{TextSelectionManager, TextSelectionState};
use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tauri::{AppHandle, Manager, RunEvent, WindowEvent};
use tauri_plugin_log::{fern, Target, TargetKind};
use tauri_specta::{collect_commands, Builder};
use utils::daily_log::{format_line, DailyLogFile};

/// Must match `identifier` in tauri.conf.json; the daily log lives under it.
const APP_IDENTIFIER: &str = "com.textlens.desktop";

/// Max level written to log files, adjustable at runtime.
pub static FILE_LOG_LEVEL: AtomicU8 = AtomicU8::new(log::LevelFilter::Debug as u8);

fn level_filter_from_u8(value: u8) -> log::LevelFilter {
    match value {
        0 => log::LevelFilter::Off,
        1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn file_log_enabled(metadata: &log::Metadata) -> bool {
    metadata.level() <= level_filter_from_u8(FILE_LOG_LEVEL.load(Ordering::Relaxed))
}

fn build_console_filter() -> env_filter::Filter {
    let mut builder = env_filter::Builder::new();

    match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => {
            if let Err(err) = builder.try_parse(&spec) {
                eprintln!(
                    "Ignoring invalid RUST_LOG value '{}': {}. Falling back to info-level console logging",
                    spec, err
                );
                builder.filter_level(log::LevelFilter::Info);
            }
        }
        _ => {
            builder.filter_level(log::LevelFilter::Info);
        }
    }

    builder.build()
}

fn build_log_plugin() -> tauri::plugin::TauriPlugin<tauri::Wry> {
    let console_filter = build_console_filter();

    let mut targets = vec![
        Target::new(TargetKind::Stdout).filter(move |metadata| console_filter.enabled(metadata)),
        Target::new(TargetKind::LogDir { file_name: None }).filter(file_log_enabled),
    ];

    match utils::daily_log::log_dir(APP_IDENTIFIER) {
        Some(dir) => {
            let daily: Box<dyn Write + Send> = Box::new(DailyLogFile::new(dir));
            targets.push(
                Target::new(TargetKind::Dispatch(fern::Dispatch::new().chain(daily)))
                    .filter(file_log_enabled),
            );
        }
        None => eprintln!("No data directory available, daily log file disabled"),
    }

    tauri_plugin_log::Builder::new()
        .level(log::LevelFilter::Trace)
        .targets(targets)
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}",
                format_line(chrono::Utc::now(), record.level(), &message.to_string())
            ))
        })
        .build()
}

fn initialize_core(app: &AppHandle) -> anyhow::Result<()> {
    let settings = settings::get_settings(app);

    let file_level: log::LevelFilter = settings.log_level.into();
    FILE_LOG_LEVEL.store(file_level as u8, Ordering::Relaxed);

    let clipboard = Arc::new(TauriClipboard::new(app.clone()));
    let manager = Arc::new(TextSelectionManager::new(app.clone(), clipboard, &settings));
    app.manage(TextSelectionState {
        manager: Arc::clone(&manager),
    });

    if settings.text_selection_enabled {
        manager.start(&settings).map_err(anyhow::Error::msg)?;
    } else {
        log::info!("Text selection disabled in settings");
    }

    Ok(())
}

fn stop_text_selection(app: &AppHandle) {
    if let Some(state) = app.try_state::<TextSelectionState>() {
        state.manager.stop();
    }
}

#[cfg(target_os = "macos")]
fn recreate_main_window(app: &AppHandle) -> anyhow::Result<()> {
    let config = app
        .config()
        .app
        .windows
        .iter()
        .find(|w| w.label == MAIN_WINDOW_LABEL)
        .ok_or_else(|| anyhow::anyhow!("No window config for '{}'", MAIN_WINDOW_LABEL))?;
    tauri::WebviewWindowBuilder::from_config(app, config)?.build()?;
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let specta_builder = Builder::<tauri::Wry>::new().commands(collect_commands![
        commands::get_app_settings,
        commands::get_default_settings,
        commands::change_text_selection_enabled_setting,
        commands::change_capture_delay_setting,
        commands::change_search_url_template_setting,
        commands::get_log_dir_path,
        commands::set_log_level,
        commands::open_log_dir,
        commands::text_selection::text_selection_start,
        commands::text_selection::text_selection_stop,
        commands::text_selection::get_text_selection_status,
        commands::text_selection::submit_text_action,
        commands::text_selection::show_main_window,
    ]);

    #[cfg(debug_assertions)] // <- Only export on non-release builds
    {
        let exported = specta_builder.export(
            specta_typescript::Typescript::default()
                .bigint(specta_typescript::BigIntExportBehavior::Number),
            "ui/bindings.ts",
        );
        if let Err(e) = exported {
            eprintln!("Failed to export typescript bindings: {}", e);
        }
    }

    let mut builder = tauri::Builder::default();

    #[cfg(desktop)]
    {
        builder = builder.plugin(tauri_plugin_single_instance::init(|app, args, _cwd| {
            log::info!("Second instance launched with {:?}, focusing main window", args);
            if let Err(e) = actions::show_main_window(app) {
                log::warn!("{}", e);
            }
        }));
    }

    let app = builder
        .plugin(build_log_plugin())
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_clipboard_manager::init())
        .plugin(tauri_plugin_opener::init())
        .invoke_handler(specta_builder.invoke_handler())
        .setup(|app| {
            log::info!("textlens {} starting", app.package_info().version);

            // The app stays usable (main window, commands) if the pipeline
            // cannot start; the failure is only logged.
            if let Err(e) = initialize_core(app.handle()) {
                log::error!("Text selection failed to start: {:#}", e);
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if window.label() != MAIN_WINDOW_LABEL {
                return;
            }
            if let WindowEvent::Destroyed = event {
                #[cfg(not(target_os = "macos"))]
                {
                    log::info!("Main window closed, shutting down");
                    stop_text_selection(window.app_handle());
                    window.app_handle().exit(0);
                }
                #[cfg(target_os = "macos")]
                {
                    log::info!("Main window closed, staying in the dock");
                }
            }
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| match event {
        #[cfg(target_os = "macos")]
        RunEvent::ExitRequested { api, code, .. } => {
            // Closing the last window keeps the app alive on macOS.
            if code.is_none() {
                api.prevent_exit();
            }
        }
        #[cfg(target_os = "macos")]
        RunEvent::Reopen { .. } => {
            if app_handle.get_webview_window(MAIN_WINDOW_LABEL).is_some() {
                if let Err(e) = actions::show_main_window(app_handle) {
                    log::warn!("{}", e);
                }
            } else if let Err(e) = recreate_main_window(app_handle) {
                log::error!("Failed to recreate main window: {:#}", e);
            }
        }
        RunEvent::Exit => {
            stop_text_selection(app_handle);
        }
        _ => {}
    });
}
