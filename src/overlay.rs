use crate::clipboard::{preview, CapturedSelection};
use crate::error::PipelineError;
use crate::settings::AppSettings;
use log::{debug, error, info, warn};
use crate::actions::window_target;
use serde::Serialize;
use specta::Type;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tauri::webview::PageLoadEvent;
use tauri::{
    AppHandle, Emitter, Monitor, PhysicalPosition, PhysicalSize, WebviewWindow,
    WebviewWindowBuilder,
};

pub type SessionId = u64;

/// Source of overlay session ids. Shared across pipeline restarts so a new
/// window never reuses the label of one still being torn down.
pub type SessionIds = Arc<AtomicU64>;

pub fn new_session_ids() -> SessionIds {
    Arc::new(AtomicU64::new(1))
}

pub const OVERLAY_LABEL_PREFIX: &str = "text_overlay_";
pub const OVERLAY_PAGE: &str = "overlay.html";
pub const TEXT_SELECTED_EVENT: &str = "text-selected";

const OVERLAY_DEFAULT_WIDTH: f64 = 1600.0;
const OVERLAY_DEFAULT_HEIGHT: f64 = 320.0;
const OVERLAY_DEFAULT_OFFSET_X: f64 = 150.0;
const OVERLAY_DEFAULT_OFFSET_Y: f64 = 140.0;

/// A point in logical screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Fixed overlay size and its offset from the cursor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLayout {
    pub width: f64,
    pub height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for OverlayLayout {
    fn default() -> Self {
        Self {
            width: OVERLAY_DEFAULT_WIDTH,
            height: OVERLAY_DEFAULT_HEIGHT,
            offset_x: OVERLAY_DEFAULT_OFFSET_X,
            offset_y: OVERLAY_DEFAULT_OFFSET_Y,
        }
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return min;
    }
    value.max(min).min(max)
}

impl OverlayLayout {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            width: settings.overlay_width,
            height: settings.overlay_height,
            offset_x: settings.overlay_offset_x,
            offset_y: settings.overlay_offset_y,
        }
    }

    /// Anchors the overlay at `cursor - offset`, kept inside `work_area` when known.
    pub fn place(&self, cursor: ScreenPoint, work_area: Option<ScreenRect>) -> OverlayGeometry {
        let mut x = cursor.x - self.offset_x;
        let mut y = cursor.y - self.offset_y;

        if let Some(area) = work_area {
            x = clamp_f64(x, area.x, area.x + area.width - self.width);
            y = clamp_f64(y, area.y, area.y + area.height - self.height);
        }

        OverlayGeometry {
            x,
            y,
            width: self.width,
            height: self.height,
        }
    }

    /// Anchor for which [`place`](Self::place) centres the overlay in `area`,
    /// or puts it at the origin when no area is known.
    pub fn centred_anchor(&self, area: Option<ScreenRect>) -> ScreenPoint {
        match area {
            Some(area) => ScreenPoint {
                x: area.x + (area.width - self.width) / 2.0 + self.offset_x,
                y: area.y + (area.height - self.height) / 2.0 + self.offset_y,
            },
            None => ScreenPoint {
                x: self.offset_x,
                y: self.offset_y,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum OverlayState {
    Closed,
    Loading,
    Shown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    FocusLost,
    ActionDispatched,
    Superseded,
    LoadFailed,
    Shutdown,
}

/// Window-level notifications a host reports back to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayWindowEvent {
    Loaded(SessionId),
    FocusLost(SessionId),
    Destroyed(SessionId),
}

/// Desktop side of the overlay: window creation, delivery and teardown.
pub trait OverlayHost {
    type Window;

    fn open(
        &self,
        session: SessionId,
        geometry: &OverlayGeometry,
        text: &str,
    ) -> Result<Self::Window, String>;

    fn deliver_text(&self, window: &Self::Window, text: &str) -> Result<(), String>;

    fn reveal(&self, window: &Self::Window) -> Result<(), String>;

    /// Releases the window. Called at most once per window.
    fn close(&self, window: Self::Window);

    fn cursor_position(&self) -> Option<ScreenPoint> {
        None
    }

    fn work_area_at(&self, _point: ScreenPoint) -> Option<ScreenRect> {
        None
    }

    fn primary_work_area(&self) -> Option<ScreenRect> {
        None
    }
}

struct OverlaySession<W> {
    id: SessionId,
    window: W,
    origin: CapturedSelection,
    state: OverlayState,
}

/// Owns at most one overlay window at a time.
///
/// A new presentation replaces the live one: the old window is closed before
/// the new one is created. Events carry the session id they were raised for,
/// so late events from a replaced window are ignored.
pub struct OverlayController<H: OverlayHost> {
    host: H,
    layout: OverlayLayout,
    session: Option<OverlaySession<H::Window>>,
    ids: SessionIds,
}

impl<H: OverlayHost> OverlayController<H> {
    pub fn new(host: H, layout: OverlayLayout, ids: SessionIds) -> Self {
        Self {
            host,
            layout,
            session: None,
            ids,
        }
    }

    pub fn set_layout(&mut self, layout: OverlayLayout) {
        self.layout = layout;
    }

    pub fn state(&self) -> OverlayState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(OverlayState::Closed)
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    #[cfg(test)]
    pub fn active_text(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.origin.text.as_str())
    }

    /// Opens a new overlay for `selection` near the current cursor, or centred
    /// on the primary monitor when the cursor cannot be located.
    pub fn present(&mut self, selection: CapturedSelection) -> Result<SessionId, PipelineError> {
        let cursor = match self.host.cursor_position() {
            Some(cursor) => cursor,
            None => {
                warn!("Cursor position unknown, centring overlay on the primary monitor");
                self.layout.centred_anchor(self.host.primary_work_area())
            }
        };
        self.present_at(selection, cursor)
    }

    pub fn present_at(
        &mut self,
        selection: CapturedSelection,
        cursor: ScreenPoint,
    ) -> Result<SessionId, PipelineError> {
        if self.session.is_some() {
            info!("Closing previous overlay before showing a new one");
            self.close(CloseReason::Superseded);
        }

        let id = self.ids.fetch_add(1, Ordering::SeqCst);

        let work_area = self.host.work_area_at(cursor);
        let geometry = self.layout.place(cursor, work_area);
        debug!(
            "Opening overlay #{} at ({:.0}, {:.0}) for cursor ({:.0}, {:.0})",
            id, geometry.x, geometry.y, cursor.x, cursor.y
        );

        let window = self
            .host
            .open(id, &geometry, &selection.text)
            .map_err(PipelineError::WindowCreate)?;

        self.session = Some(OverlaySession {
            id,
            window,
            origin: selection,
            state: OverlayState::Loading,
        });
        Ok(id)
    }

    /// The overlay UI finished loading: hand it the text and show it.
    ///
    /// A repeated load signal for a shown overlay re-sends the text only.
    pub fn on_loaded(&mut self, id: SessionId) -> Result<(), PipelineError> {
        let Some(session) = self.session.as_mut().filter(|s| s.id == id) else {
            debug!("Ignoring load signal for stale overlay #{}", id);
            return Ok(());
        };

        let delivered = self
            .host
            .deliver_text(&session.window, &session.origin.text)
            .and_then(|_| match session.state {
                OverlayState::Loading => self.host.reveal(&session.window),
                _ => Ok(()),
            });

        match delivered {
            Ok(()) => {
                if session.state == OverlayState::Loading {
                    info!("Overlay #{} shown", id);
                }
                session.state = OverlayState::Shown;
                Ok(())
            }
            Err(reason) => {
                self.close(CloseReason::LoadFailed);
                Err(PipelineError::WindowLoad(reason))
            }
        }
    }

    /// Returns true if this focus loss closed the overlay.
    pub fn on_focus_lost(&mut self, id: SessionId) -> bool {
        let live = self
            .session
            .as_ref()
            .is_some_and(|s| s.id == id && s.state == OverlayState::Shown);
        live && self.close(CloseReason::FocusLost)
    }

    /// The window went away on its own; forget it without closing it again.
    pub fn on_destroyed(&mut self, id: SessionId) {
        if self.session.as_ref().is_some_and(|s| s.id == id) {
            debug!("Overlay #{} destroyed externally", id);
            self.session = None;
        }
    }

    pub fn handle_window_event(&mut self, event: OverlayWindowEvent) -> Result<(), PipelineError> {
        match event {
            OverlayWindowEvent::Loaded(id) => self.on_loaded(id),
            OverlayWindowEvent::FocusLost(id) => {
                self.on_focus_lost(id);
                Ok(())
            }
            OverlayWindowEvent::Destroyed(id) => {
                self.on_destroyed(id);
                Ok(())
            }
        }
    }

    /// Closes the live overlay, if any. Returns false when already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        match self.session.take() {
            Some(session) => {
                info!("Closing overlay #{} ({:?})", session.id, reason);
                self.host.close(session.window);
                true
            }
            None => false,
        }
    }
}

pub fn overlay_label(id: SessionId) -> String {
    format!("{}{}", OVERLAY_LABEL_PREFIX, id)
}

pub fn session_id_from_label(label: &str) -> Option<SessionId> {
    label.strip_prefix(OVERLAY_LABEL_PREFIX)?.parse().ok()
}

/// Forces a window to be topmost using Win32 API (Windows only)
/// This is more reliable than Tauri's set_always_on_top which can be overridden
#[cfg(target_os = "windows")]
fn force_overlay_topmost(overlay_window: &WebviewWindow) {
    use windows::Win32::UI::WindowsAndMessaging::{
        SetWindowPos, HWND_TOPMOST, SWP_NOMOVE, SWP_NOSIZE, SWP_SHOWWINDOW,
    };

    let overlay_clone = overlay_window.clone();

    // Make sure the Win32 call happens on the UI thread
    let _ = overlay_clone.clone().run_on_main_thread(move || {
        if let Ok(hwnd) = overlay_clone.hwnd() {
            unsafe {
                let _ = SetWindowPos(
                    hwnd,
                    Some(HWND_TOPMOST),
                    0,
                    0,
                    0,
                    0,
                    SWP_NOMOVE | SWP_NOSIZE | SWP_SHOWWINDOW,
                );
            }
        }
    });
}

fn is_point_within_monitor(
    point: (f64, f64),
    monitor_pos: &PhysicalPosition<i32>,
    monitor_size: &PhysicalSize<u32>,
) -> bool {
    let (x, y) = point;
    let left = monitor_pos.x as f64;
    let top = monitor_pos.y as f64;

    x >= left
        && x < left + monitor_size.width as f64
        && y >= top
        && y < top + monitor_size.height as f64
}

type WindowEventSink = Arc<dyn Fn(OverlayWindowEvent) + Send + Sync>;

/// Overlay windows backed by tauri webview windows.
pub struct TauriOverlayHost {
    app_handle: AppHandle,
    on_event: WindowEventSink,
}

impl TauriOverlayHost {
    pub fn new<F>(app_handle: AppHandle, on_event: F) -> Self
    where
        F: Fn(OverlayWindowEvent) + Send + Sync + 'static,
    {
        Self {
            app_handle,
            on_event: Arc::new(on_event),
        }
    }

    fn monitor_with_cursor(&self) -> Option<(tauri::Monitor, PhysicalPosition<f64>)> {
        let cursor = self.app_handle.cursor_position().ok()?;
        if let Ok(monitors) = self.app_handle.available_monitors() {
            for monitor in monitors {
                if is_point_within_monitor((cursor.x, cursor.y), monitor.position(), monitor.size())
                {
                    return Some((monitor, cursor));
                }
            }
        }
        let primary = self.app_handle.primary_monitor().ok().flatten()?;
        Some((primary, cursor))
    }
}

fn logical_work_area(monitor: &Monitor) -> ScreenRect {
    let work_area = monitor.work_area();
    let scale = monitor.scale_factor();
    ScreenRect {
        x: work_area.position.x as f64 / scale,
        y: work_area.position.y as f64 / scale,
        width: work_area.size.width as f64 / scale,
        height: work_area.size.height as f64 / scale,
    }
}

impl OverlayHost for TauriOverlayHost {
    type Window = WebviewWindow;

    fn open(
        &self,
        session: SessionId,
        geometry: &OverlayGeometry,
        text: &str,
    ) -> Result<WebviewWindow, String> {
        let page = format!("{}?text={}", OVERLAY_PAGE, urlencoding::encode(text));
        let on_load = Arc::clone(&self.on_event);
        let on_window = Arc::clone(&self.on_event);

        let window = WebviewWindowBuilder::new(
            &self.app_handle,
            overlay_label(session),
            tauri::WebviewUrl::App(page.into()),
        )
        .title("Text Assistant")
        .position(geometry.x, geometry.y)
        .inner_size(geometry.width, geometry.height)
        .resizable(false)
        .maximizable(false)
        .minimizable(false)
        .closable(true)
        .decorations(false)
        .shadow(false)
        .transparent(true)
        .always_on_top(true)
        .skip_taskbar(true)
        .accept_first_mouse(true)
        .focused(false)
        .visible(false)
        .on_page_load(move |_window, payload| {
            if payload.event() == PageLoadEvent::Finished {
                on_load(OverlayWindowEvent::Loaded(session));
            }
        })
        .build()
        .map_err(|e| format!("Failed to create overlay window: {}", e))?;

        window.on_window_event(move |event| match event {
            tauri::WindowEvent::Focused(false) => {
                on_window(OverlayWindowEvent::FocusLost(session));
            }
            tauri::WindowEvent::Destroyed => {
                on_window(OverlayWindowEvent::Destroyed(session));
            }
            _ => {}
        });

        debug!("Overlay window {} created (hidden)", window.label());
        Ok(window)
    }

    fn deliver_text(&self, window: &WebviewWindow, text: &str) -> Result<(), String> {
        window
            .emit_to(window_target(window.label()), TEXT_SELECTED_EVENT, text)
            .map_err(|e| format!("Failed to emit {}: {}", TEXT_SELECTED_EVENT, e))
    }

    fn reveal(&self, window: &WebviewWindow) -> Result<(), String> {
        window
            .show()
            .map_err(|e| format!("Failed to show overlay: {}", e))?;

        #[cfg(target_os = "windows")]
        force_overlay_topmost(window);

        // Focus is needed so the buttons take clicks and blur can close us.
        if let Err(e) = window.set_focus() {
            warn!("Failed to focus overlay {}: {}", window.label(), e);
        }
        Ok(())
    }

    fn close(&self, window: WebviewWindow) {
        if let Err(e) = window.destroy() {
            error!("Failed to destroy overlay {}: {}", window.label(), e);
        }
    }

    fn cursor_position(&self) -> Option<ScreenPoint> {
        let (monitor, cursor) = self.monitor_with_cursor()?;
        let scale = monitor.scale_factor();
        Some(ScreenPoint {
            x: cursor.x / scale,
            y: cursor.y / scale,
        })
    }

    fn work_area_at(&self, _point: ScreenPoint) -> Option<ScreenRect> {
        match self.monitor_with_cursor() {
            Some((monitor, _)) => Some(logical_work_area(&monitor)),
            None => self.primary_work_area(),
        }
    }

    fn primary_work_area(&self) -> Option<ScreenRect> {
        let primary = self.app_handle.primary_monitor().ok().flatten()?;
        Some(logical_work_area(&primary))
    }
}

/// Logs a text preview of the selection an overlay was opened for.
pub fn describe_selection(selection: &CapturedSelection) -> String {
    format!(
        "{} chars, preview={:?}",
        selection.text.chars().count(),
        preview(&selection.text, 50)
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    pub enum HostCall {
        Open(SessionId),
        Deliver(SessionId, String),
        Reveal(SessionId),
        Close(SessionId),
    }

    /// In-memory host that records every call.
    #[derive(Clone, Default)]
    pub struct FakeHost {
        pub calls: Rc<RefCell<Vec<HostCall>>>,
        pub geometries: Rc<RefCell<Vec<OverlayGeometry>>>,
        pub fail_open: Rc<RefCell<bool>>,
        pub fail_deliver: Rc<RefCell<bool>>,
        pub cursor_unknown: Rc<RefCell<bool>>,
        pub primary_area: Rc<RefCell<Option<ScreenRect>>>,
    }

    impl FakeHost {
        pub fn calls(&self) -> Vec<HostCall> {
            self.calls.borrow().clone()
        }

        pub fn last_geometry(&self) -> Option<OverlayGeometry> {
            self.geometries.borrow().last().copied()
        }

        pub fn open_windows(&self) -> usize {
            let calls = self.calls.borrow();
            let opened = calls.iter().filter(|c| matches!(c, HostCall::Open(_))).count();
            let closed = calls.iter().filter(|c| matches!(c, HostCall::Close(_))).count();
            opened - closed
        }

        pub fn close_count(&self, id: SessionId) -> usize {
            self.calls
                .borrow()
                .iter()
                .filter(|c| **c == HostCall::Close(id))
                .count()
        }
    }

    impl OverlayHost for FakeHost {
        type Window = SessionId;

        fn open(
            &self,
            session: SessionId,
            geometry: &OverlayGeometry,
            _: &str,
        ) -> Result<SessionId, String> {
            if *self.fail_open.borrow() {
                return Err("no display".into());
            }
            self.calls.borrow_mut().push(HostCall::Open(session));
            self.geometries.borrow_mut().push(*geometry);
            Ok(session)
        }

        fn deliver_text(&self, window: &SessionId, text: &str) -> Result<(), String> {
            if *self.fail_deliver.borrow() {
                return Err("webview gone".into());
            }
            self.calls
                .borrow_mut()
                .push(HostCall::Deliver(*window, text.to_string()));
            Ok(())
        }

        fn reveal(&self, window: &SessionId) -> Result<(), String> {
            self.calls.borrow_mut().push(HostCall::Reveal(*window));
            Ok(())
        }

        fn close(&self, window: SessionId) {
            self.calls.borrow_mut().push(HostCall::Close(window));
        }

        fn cursor_position(&self) -> Option<ScreenPoint> {
            if *self.cursor_unknown.borrow() {
                return None;
            }
            Some(ScreenPoint { x: 500.0, y: 400.0 })
        }

        fn primary_work_area(&self) -> Option<ScreenRect> {
            *self.primary_area.borrow()
        }
    }

    fn controller() -> (OverlayController<FakeHost>, FakeHost) {
        let host = FakeHost::default();
        let overlay =
            OverlayController::new(host.clone(), OverlayLayout::default(), new_session_ids());
        (overlay, host)
    }

    #[test]
    fn test_lifecycle_closed_loading_shown_closed() {
        let (mut overlay, host) = controller();
        assert_eq!(overlay.state(), OverlayState::Closed);

        let id = overlay.present(CapturedSelection::new("hello")).unwrap();
        assert_eq!(overlay.state(), OverlayState::Loading);
        let geometry = host.last_geometry().unwrap();
        assert_eq!((geometry.x, geometry.y), (350.0, 260.0));

        overlay.on_loaded(id).unwrap();
        assert_eq!(overlay.state(), OverlayState::Shown);

        assert!(overlay.on_focus_lost(id));
        assert_eq!(overlay.state(), OverlayState::Closed);
        assert_eq!(
            host.calls(),
            vec![
                HostCall::Open(id),
                HostCall::Deliver(id, "hello".into()),
                HostCall::Reveal(id),
                HostCall::Close(id),
            ]
        );
    }

    #[test]
    fn test_new_presentation_replaces_old() {
        let (mut overlay, host) = controller();
        let first = overlay.present(CapturedSelection::new("one")).unwrap();
        overlay.on_loaded(first).unwrap();

        let second = overlay.present(CapturedSelection::new("two")).unwrap();
        assert_ne!(first, second);
        assert_eq!(host.close_count(first), 1);
        assert_eq!(host.open_windows(), 1);
        assert_eq!(overlay.active_text(), Some("two"));

        // Close of `first` must precede creation of `second`.
        let calls = host.calls();
        let close_at = calls.iter().position(|c| *c == HostCall::Close(first)).unwrap();
        let open_at = calls.iter().position(|c| *c == HostCall::Open(second)).unwrap();
        assert!(close_at < open_at);
    }

    #[test]
    fn test_replacing_a_loading_overlay() {
        let (mut overlay, host) = controller();
        let first = overlay.present(CapturedSelection::new("one")).unwrap();
        let second = overlay.present(CapturedSelection::new("two")).unwrap();
        overlay.on_loaded(first).unwrap();
        assert_eq!(overlay.state(), OverlayState::Loading);
        overlay.on_loaded(second).unwrap();
        assert_eq!(overlay.state(), OverlayState::Shown);
        assert_eq!(host.close_count(first), 1);
        assert!(!host.calls().contains(&HostCall::Reveal(first)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut overlay, host) = controller();
        let id = overlay.present(CapturedSelection::new("x")).unwrap();
        overlay.on_loaded(id).unwrap();
        assert!(overlay.close(CloseReason::ActionDispatched));
        assert!(!overlay.close(CloseReason::ActionDispatched));
        assert!(!overlay.on_focus_lost(id));
        assert_eq!(host.close_count(id), 1);
    }

    #[test]
    fn test_stale_focus_loss_after_replacement() {
        let (mut overlay, host) = controller();
        let first = overlay.present(CapturedSelection::new("one")).unwrap();
        overlay.on_loaded(first).unwrap();
        let second = overlay.present(CapturedSelection::new("two")).unwrap();
        overlay.on_loaded(second).unwrap();

        // The replaced window reports its blur late.
        assert!(!overlay.on_focus_lost(first));
        assert_eq!(overlay.state(), OverlayState::Shown);
        assert_eq!(host.close_count(first), 1);
        assert_eq!(host.close_count(second), 0);
    }

    #[test]
    fn test_focus_loss_while_loading_is_ignored() {
        let (mut overlay, _host) = controller();
        let id = overlay.present(CapturedSelection::new("x")).unwrap();
        assert!(!overlay.on_focus_lost(id));
        assert_eq!(overlay.state(), OverlayState::Loading);
    }

    #[test]
    fn test_create_failure_leaves_closed() {
        let (mut overlay, host) = controller();
        *host.fail_open.borrow_mut() = true;
        let err = overlay.present(CapturedSelection::new("x")).unwrap_err();
        assert!(matches!(err, PipelineError::WindowCreate(_)));
        assert_eq!(overlay.state(), OverlayState::Closed);
        assert_eq!(host.open_windows(), 0);
    }

    #[test]
    fn test_load_failure_releases_window() {
        let (mut overlay, host) = controller();
        let id = overlay.present(CapturedSelection::new("x")).unwrap();
        *host.fail_deliver.borrow_mut() = true;
        let err = overlay.on_loaded(id).unwrap_err();
        assert!(matches!(err, PipelineError::WindowLoad(_)));
        assert_eq!(overlay.state(), OverlayState::Closed);
        assert_eq!(host.close_count(id), 1);
    }

    #[test]
    fn test_repeated_load_resends_text_only() {
        let (mut overlay, host) = controller();
        let id = overlay.present(CapturedSelection::new("x")).unwrap();
        overlay.on_loaded(id).unwrap();
        overlay.on_loaded(id).unwrap();
        let reveals = host
            .calls()
            .iter()
            .filter(|c| **c == HostCall::Reveal(id))
            .count();
        assert_eq!(reveals, 1);
        assert_eq!(
            host.calls().last(),
            Some(&HostCall::Deliver(id, "x".into()))
        );
    }

    #[test]
    fn test_external_destroy_forgets_without_closing() {
        let (mut overlay, host) = controller();
        let id = overlay.present(CapturedSelection::new("x")).unwrap();
        overlay.handle_window_event(OverlayWindowEvent::Destroyed(id)).unwrap();
        assert_eq!(overlay.state(), OverlayState::Closed);
        assert_eq!(host.close_count(id), 0);
    }

    #[test]
    fn test_layout_anchors_above_left_of_cursor() {
        let layout = OverlayLayout {
            width: 300.0,
            height: 100.0,
            offset_x: 150.0,
            offset_y: 140.0,
        };
        let geometry = layout.place(ScreenPoint { x: 800.0, y: 600.0 }, None);
        assert_eq!((geometry.x, geometry.y), (650.0, 460.0));
        assert_eq!((geometry.width, geometry.height), (300.0, 100.0));
    }

    #[test]
    fn test_layout_clamped_to_work_area() {
        let layout = OverlayLayout {
            width: 300.0,
            height: 100.0,
            offset_x: 150.0,
            offset_y: 140.0,
        };
        let area = ScreenRect {
            x: 0.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        };
        let near_origin = layout.place(ScreenPoint { x: 10.0, y: 10.0 }, Some(area));
        assert_eq!((near_origin.x, near_origin.y), (0.0, 0.0));
        let near_corner = layout.place(ScreenPoint { x: 1919.0, y: 1079.0 }, Some(area));
        assert_eq!((near_corner.x, near_corner.y), (1620.0, 939.0));
    }

    #[test]
    fn test_label_round_trip() {
        assert_eq!(session_id_from_label(&overlay_label(42)), Some(42));
        assert_eq!(session_id_from_label("main"), None);
    }

    #[test]
    fn test_unknown_cursor_centres_on_primary_monitor() {
        let (mut overlay, host) = controller();
        *host.cursor_unknown.borrow_mut() = true;
        *host.primary_area.borrow_mut() = Some(ScreenRect {
            x: 0.0,
            y: 0.0,
            width: 1920.0,
            height: 1080.0,
        });

        overlay.present(CapturedSelection::new("x")).unwrap();
        let geometry = host.last_geometry().unwrap();
        assert_eq!((geometry.x, geometry.y), (160.0, 380.0));
    }

    #[test]
    fn test_unknown_cursor_without_monitor_stays_on_screen() {
        let (mut overlay, host) = controller();
        *host.cursor_unknown.borrow_mut() = true;

        overlay.present(CapturedSelection::new("x")).unwrap();
        let geometry = host.last_geometry().unwrap();
        assert_eq!((geometry.x, geometry.y), (0.0, 0.0));
    }

    #[test]
    fn test_shared_ids_are_not_reused_across_controllers() {
        let ids = new_session_ids();
        let host = FakeHost::default();
        let mut before =
            OverlayController::new(host.clone(), OverlayLayout::default(), Arc::clone(&ids));
        let old = before.present(CapturedSelection::new("x")).unwrap();
        drop(before);

        let mut after = OverlayController::new(host, OverlayLayout::default(), ids);
        let new = after.present(CapturedSelection::new("y")).unwrap();
        assert_ne!(overlay_label(old), overlay_label(new));
    }
}
