//! Text-selection pipeline.
//!
//! All pipeline state (last capture, overlay session, relay) lives in one
//! [`SelectionPipeline`] driven by a single task. The key listener thread,
//! overlay window callbacks and tauri commands only send [`SelectionEvent`]s
//! into its channel, so overlay presentation is strictly serialized.

use crate::actions::{
    ActionRelay, BrowserOpener, MainWindowRelay, TauriBrowser, TauriMainWindow, TextActionRequest,
};
use crate::clipboard::{
    read_after_copy, CaptureOutcome, CapturePolicy, ClipboardSource, SelectionCapture,
};
use crate::managers::key_listener::{KeyListenerManager, MonitorSignal, MonitorStatus};
use crate::overlay::{
    describe_selection, new_session_ids, CloseReason, OverlayController, OverlayHost,
    OverlayLayout, OverlayState, OverlayWindowEvent, SessionId, SessionIds, TauriOverlayHost,
};
use crate::settings::AppSettings;
use log::{debug, error, info, warn};
use serde::Serialize;
use specta::Type;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tauri::AppHandle;
use tokio::sync::mpsc;

#[derive(Debug)]
pub enum SelectionEvent {
    CopyGesture,
    ClipboardRead(Result<String, String>),
    Overlay(OverlayWindowEvent),
    /// A choice from the overlay UI; `session` is the overlay it came from.
    TextAction {
        request: TextActionRequest,
        session: Option<SessionId>,
    },
    SettingsChanged(AppSettings),
    Shutdown,
}

/// Work the driver has to do after an event was handled.
#[derive(Debug, PartialEq)]
pub enum FollowUp {
    Idle,
    ScheduleCapture {
        policy: CapturePolicy,
        last: Option<String>,
    },
    Stop,
}

pub struct SelectionPipeline<H: OverlayHost, M, B> {
    capture: SelectionCapture,
    overlay: OverlayController<H>,
    relay: ActionRelay<M, B>,
    policy: CapturePolicy,
    capture_pending: bool,
}

impl<H, M, B> SelectionPipeline<H, M, B>
where
    H: OverlayHost,
    M: MainWindowRelay,
    B: BrowserOpener,
{
    pub fn new(
        host: H,
        main_window: M,
        browser: B,
        settings: &AppSettings,
        session_ids: SessionIds,
    ) -> Self {
        let layout = OverlayLayout::from_settings(settings);
        Self {
            capture: SelectionCapture::new(),
            overlay: OverlayController::new(host, layout, session_ids),
            relay: ActionRelay::new(main_window, browser, settings.search_url_template.clone()),
            policy: CapturePolicy::from_settings(settings),
            capture_pending: false,
        }
    }

    pub fn overlay(&self) -> &OverlayController<H> {
        &self.overlay
    }

    pub fn relay(&self) -> &ActionRelay<M, B> {
        &self.relay
    }

    pub fn handle(&mut self, event: SelectionEvent) -> FollowUp {
        match event {
            SelectionEvent::CopyGesture => {
                // Key repeat while the chord is held would otherwise queue a
                // read per repeat; one pending read covers them all.
                if self.capture_pending {
                    debug!("Copy gesture while a capture is pending, coalesced");
                    return FollowUp::Idle;
                }
                self.capture_pending = true;
                FollowUp::ScheduleCapture {
                    policy: self.policy,
                    last: self.capture.last_text().map(str::to_string),
                }
            }
            SelectionEvent::ClipboardRead(read) => {
                self.capture_pending = false;
                self.on_clipboard_read(read);
                FollowUp::Idle
            }
            SelectionEvent::Overlay(window_event) => {
                if let Err(e) = self.overlay.handle_window_event(window_event) {
                    error!("{}", e);
                }
                FollowUp::Idle
            }
            SelectionEvent::TextAction { request, session } => {
                self.on_text_action(request, session);
                FollowUp::Idle
            }
            SelectionEvent::SettingsChanged(settings) => {
                self.apply_settings(&settings);
                FollowUp::Idle
            }
            SelectionEvent::Shutdown => {
                self.overlay.close(CloseReason::Shutdown);
                FollowUp::Stop
            }
        }
    }

    fn on_clipboard_read(&mut self, read: Result<String, String>) {
        match self.capture.accept(read) {
            Ok(CaptureOutcome::Captured(selection)) => {
                debug!("Presenting overlay: {}", describe_selection(&selection));
                if let Err(e) = self.overlay.present(selection) {
                    error!("{}", e);
                }
            }
            Ok(CaptureOutcome::Blank) => debug!("Clipboard is blank, no overlay"),
            Ok(CaptureOutcome::Duplicate) => debug!("Clipboard unchanged, no overlay"),
            Err(e) => warn!("{}", e),
        }
    }

    fn on_text_action(&mut self, request: TextActionRequest, session: Option<SessionId>) {
        if let Err(e) = self.relay.dispatch(&request) {
            error!("{}", e);
        }

        let from_live_overlay = match session {
            Some(id) => self.overlay.active_session() == Some(id),
            None => true,
        };
        if from_live_overlay {
            self.overlay.close(CloseReason::ActionDispatched);
        } else {
            debug!("Action came from a closed overlay, live overlay kept");
        }
    }

    fn apply_settings(&mut self, settings: &AppSettings) {
        self.policy = CapturePolicy::from_settings(settings);
        self.overlay.set_layout(OverlayLayout::from_settings(settings));
        self.relay.set_search_url_template(settings.search_url_template.clone());
        debug!("Pipeline settings updated");
    }
}

/// Drives `pipeline` until a [`SelectionEvent::Shutdown`] or until every
/// sender is gone, then hands the pipeline back.
pub async fn run_pipeline<H, M, B>(
    mut pipeline: SelectionPipeline<H, M, B>,
    mut events: mpsc::UnboundedReceiver<SelectionEvent>,
    sender: mpsc::WeakUnboundedSender<SelectionEvent>,
    clipboard: Arc<dyn ClipboardSource>,
    overlay_state: Arc<AtomicU8>,
) -> SelectionPipeline<H, M, B>
where
    H: OverlayHost,
    M: MainWindowRelay,
    B: BrowserOpener,
{
    while let Some(event) = events.recv().await {
        let follow_up = pipeline.handle(event);
        overlay_state.store(encode_state(pipeline.overlay().state()), Ordering::Relaxed);

        match follow_up {
            FollowUp::Idle => {}
            FollowUp::ScheduleCapture { policy, last } => {
                let Some(tx) = sender.upgrade() else {
                    break;
                };
                let read_task = tauri::async_runtime::spawn(read_after_copy(
                    Arc::clone(&clipboard),
                    policy,
                    last,
                ));
                // Every scheduled capture reports back, even if the read task
                // dies, or the pending flag would swallow all later gestures.
                tauri::async_runtime::spawn(async move {
                    let read = match read_task.await {
                        Ok(read) => read,
                        Err(e) => Err(format!("Clipboard read task failed: {}", e)),
                    };
                    let _ = tx.send(SelectionEvent::ClipboardRead(read));
                });
            }
            FollowUp::Stop => break,
        }
    }

    overlay_state.store(encode_state(OverlayState::Closed), Ordering::Relaxed);
    info!("Text selection pipeline stopped");
    pipeline
}

fn encode_state(state: OverlayState) -> u8 {
    match state {
        OverlayState::Closed => 0,
        OverlayState::Loading => 1,
        OverlayState::Shown => 2,
    }
}

fn decode_state(value: u8) -> OverlayState {
    match value {
        1 => OverlayState::Loading,
        2 => OverlayState::Shown,
        _ => OverlayState::Closed,
    }
}

#[derive(Debug, Clone, Serialize, Type)]
pub struct TextSelectionStatus {
    pub running: bool,
    pub monitor: MonitorStatus,
    pub overlay: OverlayState,
}

type EventSender = mpsc::UnboundedSender<SelectionEvent>;

/// Starts and stops the key listener together with the pipeline task.
pub struct TextSelectionManager {
    app_handle: AppHandle,
    key_listener: KeyListenerManager,
    clipboard: Arc<dyn ClipboardSource>,
    sender: Mutex<Option<EventSender>>,
    overlay_state: Arc<AtomicU8>,
    session_ids: SessionIds,
}

impl TextSelectionManager {
    pub fn new(
        app_handle: AppHandle,
        clipboard: Arc<dyn ClipboardSource>,
        settings: &AppSettings,
    ) -> Self {
        Self {
            app_handle,
            key_listener: KeyListenerManager::new(settings.key_table()),
            clipboard,
            sender: Mutex::new(None),
            overlay_state: Arc::new(AtomicU8::new(0)),
            session_ids: new_session_ids(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .map(|s| s.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    pub fn status(&self) -> TextSelectionStatus {
        TextSelectionStatus {
            running: self.is_running(),
            monitor: self.key_listener.status(),
            overlay: decode_state(self.overlay_state.load(Ordering::Relaxed)),
        }
    }

    /// Spawns the pipeline and attaches the key listener. No-op when running.
    pub fn start(&self, settings: &AppSettings) -> Result<(), String> {
        let mut guard = self
            .sender
            .lock()
            .map_err(|_| "Text selection state lock poisoned".to_string())?;
        if guard.as_ref().is_some_and(|tx| !tx.is_closed()) {
            debug!("Text selection already running");
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();

        let overlay_tx = tx.clone();
        let host = TauriOverlayHost::new(self.app_handle.clone(), move |event| {
            let _ = overlay_tx.send(SelectionEvent::Overlay(event));
        });
        let pipeline = SelectionPipeline::new(
            host,
            TauriMainWindow::new(self.app_handle.clone()),
            TauriBrowser::new(self.app_handle.clone()),
            settings,
            Arc::clone(&self.session_ids),
        );

        tauri::async_runtime::spawn(run_pipeline(
            pipeline,
            rx,
            tx.downgrade(),
            Arc::clone(&self.clipboard),
            Arc::clone(&self.overlay_state),
        ));

        self.key_listener.set_key_table(settings.key_table());
        let gesture_tx = tx.clone();
        self.key_listener.start(move |signal| match signal {
            MonitorSignal::CopyGestureDetected => {
                let _ = gesture_tx.send(SelectionEvent::CopyGesture);
            }
        });

        *guard = Some(tx);
        info!("Text selection started");
        Ok(())
    }

    /// Detaches the key listener and closes any overlay. Safe to repeat.
    pub fn stop(&self) {
        self.key_listener.stop();
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        if let Some(tx) = sender {
            let _ = tx.send(SelectionEvent::Shutdown);
            info!("Text selection stopped");
        }
    }

    pub fn submit_action(
        &self,
        request: TextActionRequest,
        session: Option<SessionId>,
    ) -> Result<(), String> {
        self.send(SelectionEvent::TextAction { request, session })
    }

    pub fn apply_settings(&self, settings: &AppSettings) {
        self.key_listener.set_key_table(settings.key_table());
        if self.is_running() {
            let _ = self.send(SelectionEvent::SettingsChanged(settings.clone()));
        }
    }

    fn send(&self, event: SelectionEvent) -> Result<(), String> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| "Text selection state lock poisoned".to_string())?;
        let tx = guard
            .as_ref()
            .ok_or_else(|| "Text selection is not running".to_string())?;
        tx.send(event)
            .map_err(|_| "Text selection pipeline has stopped".to_string())
    }
}

pub struct TextSelectionState {
    pub manager: Arc<TextSelectionManager>,
}
