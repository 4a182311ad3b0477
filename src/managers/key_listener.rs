//! Global keyboard monitor.
//!
//! Wraps an rdev hook that sees key events system-wide (not only while the app
//! is focused), tracks whether ctrl is held, and reports copy gestures to the
//! text-selection pipeline.

use crate::error::PipelineError;
use crate::key_classifier::{KeyEvent, KeyTable};
use log::{debug, error, info, warn};
use serde::Serialize;
use specta::Type;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Transient modifier state, owned by the monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub ctrl_pressed: bool,
}

/// What a single key event meant to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorSignal {
    CopyGestureDetected,
}

/// `CtrlUp <-> CtrlDown` state machine fed with classified key events.
pub struct ModifierTracker {
    table: KeyTable,
    state: ModifierState,
}

impl ModifierTracker {
    pub fn new(table: KeyTable) -> Self {
        Self {
            table,
            state: ModifierState::default(),
        }
    }

    pub fn state(&self) -> ModifierState {
        self.state
    }

    /// Swaps the key table without forgetting a held modifier.
    pub fn replace_table(&mut self, table: KeyTable) {
        self.table = table;
    }

    pub fn chord_label(&self) -> String {
        format!("Ctrl+{}", self.table.copy_letter())
    }

    pub fn process(&mut self, event: &KeyEvent) -> Option<MonitorSignal> {
        let name = event.raw_name.as_str();
        let code = event.virtual_key_code;

        if self.table.is_ctrl(name, code) {
            self.state.ctrl_pressed = event.is_down;
            return None;
        }

        if event.is_down && self.table.is_copy_chord(name, code, self.state.ctrl_pressed) {
            debug!(
                "Copy chord detected ({}, key {})",
                self.chord_label(),
                self.table.friendly_name(name, code)
            );
            return Some(MonitorSignal::CopyGestureDetected);
        }

        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Type)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum MonitorStatus {
    Stopped,
    Running,
    Disabled(String),
}

type SignalSink = Arc<dyn Fn(MonitorSignal) + Send + Sync>;

/// Owns the OS-level hook thread.
///
/// rdev's `listen` blocks its thread for the lifetime of the hook, so the hook
/// is installed once and `stop()` only detaches the pipeline from it. The hook
/// itself is released when the process exits.
pub struct KeyListenerManager {
    table: Arc<Mutex<KeyTable>>,
    table_generation: Arc<AtomicU64>,
    enabled: Arc<AtomicBool>,
    hook_installed: AtomicBool,
    status: Arc<Mutex<MonitorStatus>>,
    sink: Arc<Mutex<Option<SignalSink>>>,
}

impl KeyListenerManager {
    pub fn new(table: KeyTable) -> Self {
        Self {
            table: Arc::new(Mutex::new(table)),
            table_generation: Arc::new(AtomicU64::new(0)),
            enabled: Arc::new(AtomicBool::new(false)),
            hook_installed: AtomicBool::new(false),
            status: Arc::new(Mutex::new(MonitorStatus::Stopped)),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> MonitorStatus {
        self.status
            .lock()
            .map(|status| status.clone())
            .unwrap_or_else(|_| MonitorStatus::Disabled("status lock poisoned".to_string()))
    }

    /// Replaces the key table. Takes effect for the next key event.
    pub fn set_key_table(&self, table: KeyTable) {
        if let Ok(mut guard) = self.table.lock() {
            *guard = table;
            self.table_generation.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Starts delivering copy gestures to `on_signal`.
    ///
    /// Never fails: if the hook cannot be installed the monitor logs the reason
    /// and stays in [`MonitorStatus::Disabled`].
    pub fn start<F>(&self, on_signal: F)
    where
        F: Fn(MonitorSignal) + Send + Sync + 'static,
    {
        if let MonitorStatus::Disabled(reason) = self.status() {
            warn!("Key listener stays disabled: {}", reason);
            return;
        }

        self.attach(on_signal);
        self.set_status(MonitorStatus::Running);

        if self.hook_installed.swap(true, Ordering::SeqCst) {
            info!("Key listener resumed");
            return;
        }

        // Modifier state is tracked even while detached so a resumed
        // listener does not start with a stale ctrl flag.
        let mut handler = self.hook_handler();
        let status = Arc::clone(&self.status);
        let enabled = Arc::clone(&self.enabled);

        let spawn_result = std::thread::Builder::new()
            .name("global-key-listener".into())
            .spawn(move || {
                let callback = move |event: rdev::Event| {
                    if let Some(key_event) = key_event_from_rdev(&event) {
                        handler.on_key_event_guarded(&key_event);
                    }
                };

                info!("Installing global keyboard hook");
                if let Err(e) = rdev::listen(callback) {
                    record_hook_failure(&status, &enabled, format!("{:?}", e));
                }
            });

        if let Err(e) = spawn_result {
            self.hook_installed.store(false, Ordering::SeqCst);
            record_hook_failure(
                &self.status,
                &self.enabled,
                format!("failed to spawn listener thread: {}", e),
            );
        }
    }

    fn attach<F>(&self, on_signal: F)
    where
        F: Fn(MonitorSignal) + Send + Sync + 'static,
    {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = Some(Arc::new(on_signal));
        }
        self.enabled.store(true, Ordering::SeqCst);
    }

    fn hook_handler(&self) -> HookHandler {
        let table = self.table.lock().map(|t| t.clone()).unwrap_or_default();
        HookHandler {
            table: Arc::clone(&self.table),
            table_generation: Arc::clone(&self.table_generation),
            seen_generation: self.table_generation.load(Ordering::SeqCst),
            enabled: Arc::clone(&self.enabled),
            sink: Arc::clone(&self.sink),
            tracker: ModifierTracker::new(table),
        }
    }

    /// Stops delivering events. Safe to call repeatedly.
    pub fn stop(&self) {
        let was_enabled = self.enabled.swap(false, Ordering::SeqCst);
        if let Ok(mut sink) = self.sink.lock() {
            sink.take();
        }
        if !matches!(self.status(), MonitorStatus::Disabled(_)) {
            self.set_status(MonitorStatus::Stopped);
        }
        if was_enabled {
            info!("Key listener stopped");
        }
    }

    fn set_status(&self, status: MonitorStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }
}

/// What the hook callback carries from one key event to the next.
struct HookHandler {
    table: Arc<Mutex<KeyTable>>,
    table_generation: Arc<AtomicU64>,
    seen_generation: u64,
    enabled: Arc<AtomicBool>,
    sink: Arc<Mutex<Option<SignalSink>>>,
    tracker: ModifierTracker,
}

impl HookHandler {
    fn on_key_event(&mut self, event: &KeyEvent) {
        let generation = self.table_generation.load(Ordering::SeqCst);
        if generation != self.seen_generation {
            if let Ok(current) = self.table.lock() {
                self.tracker.replace_table(current.clone());
                self.seen_generation = generation;
            }
        }

        let signal = self.tracker.process(event);
        if let Some(signal) = signal.filter(|_| self.enabled.load(Ordering::SeqCst)) {
            let sink = self.sink.lock().ok().and_then(|s| s.clone());
            if let Some(sink) = sink {
                sink(signal);
            }
        }
    }

    /// Panics must not unwind into the OS hook.
    fn on_key_event_guarded(&mut self, event: &KeyEvent) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.on_key_event(event)));
        if outcome.is_err() {
            error!("Key event handler panicked; event dropped");
        }
    }
}

/// Leaves the monitor in `Disabled` for good; the app keeps running without it.
fn record_hook_failure(status: &Mutex<MonitorStatus>, enabled: &AtomicBool, reason: String) {
    let err = PipelineError::HookInstall(reason);
    error!("{}", err);
    enabled.store(false, Ordering::SeqCst);
    if let Ok(mut guard) = status.lock() {
        *guard = MonitorStatus::Disabled(err.to_string());
    }
}

/// Converts an rdev event into the classifier's input. Non-keyboard events
/// (mouse, wheel) are skipped.
fn key_event_from_rdev(event: &rdev::Event) -> Option<KeyEvent> {
    let (key, is_down) = match event.event_type {
        rdev::EventType::KeyPress(key) => (key, true),
        rdev::EventType::KeyRelease(key) => (key, false),
        _ => return None,
    };
    Some(KeyEvent {
        raw_name: format!("{:?}", key),
        virtual_key_code: event.platform_code,
        is_down,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_classifier::KeyKind;
    use std::sync::atomic::AtomicUsize;

    fn table() -> KeyTable {
        let mut table = KeyTable::with_common_names('C');
        table.insert_code(162, KeyKind::Ctrl);
        table.insert_code(163, KeyKind::Ctrl);
        table.insert_code(67, KeyKind::Letter('C'));
        table
    }

    fn tracker() -> ModifierTracker {
        ModifierTracker::new(table())
    }

    #[test]
    fn test_ctrl_state_follows_latest_ctrl_event() {
        let mut t = tracker();
        let sequence = [
            (KeyEvent::down("LEFT CTRL", 162), true),
            (KeyEvent::down("A", 65), true),
            (KeyEvent::up("A", 65), true),
            (KeyEvent::down("SHIFT", 160), true),
            (KeyEvent::up("RIGHT CTRL", 163), false),
            (KeyEvent::down("F5", 116), false),
            (KeyEvent::down("Control_L", 0), true),
        ];
        for (event, expected) in sequence {
            t.process(&event);
            assert_eq!(t.state().ctrl_pressed, expected, "after {:?}", event);
        }
    }

    #[test]
    fn test_copy_gesture_only_with_ctrl_held() {
        let mut t = tracker();
        assert_eq!(t.process(&KeyEvent::down("C", 67)), None);

        t.process(&KeyEvent::down("LEFT CTRL", 162));
        assert_eq!(
            t.process(&KeyEvent::down("C", 67)),
            Some(MonitorSignal::CopyGestureDetected)
        );
        // Key-up of the letter never fires.
        assert_eq!(t.process(&KeyEvent::up("C", 67)), None);
        assert!(t.state().ctrl_pressed);

        t.process(&KeyEvent::up("LEFT CTRL", 162));
        assert_eq!(t.process(&KeyEvent::down("C", 67)), None);
    }

    #[test]
    fn test_copy_gesture_does_not_change_modifier_state() {
        let mut t = tracker();
        t.process(&KeyEvent::down("ControlLeft", 0));
        assert!(t.process(&KeyEvent::down("KeyC", 0)).is_some());
        assert!(t.process(&KeyEvent::down("KeyC", 0)).is_some());
        assert!(t.state().ctrl_pressed);
    }

    #[test]
    fn test_manager_starts_stopped() {
        let manager = KeyListenerManager::new(KeyTable::with_common_names('C'));
        assert_eq!(manager.status(), MonitorStatus::Stopped);
        manager.stop();
        assert_eq!(manager.status(), MonitorStatus::Stopped);
    }

    #[test]
    fn test_chord_label_names_ctrl() {
        assert_eq!(tracker().chord_label(), "Ctrl+C");
    }

    #[test]
    fn test_panicking_sink_keeps_listener_subscribed() {
        let manager = KeyListenerManager::new(table());
        let received = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&received);
        manager.attach(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first gesture handler failed");
            }
        });

        let mut handler = manager.hook_handler();
        handler.on_key_event_guarded(&KeyEvent::down("LEFT CTRL", 162));
        handler.on_key_event_guarded(&KeyEvent::down("C", 67));
        handler.on_key_event_guarded(&KeyEvent::down("C", 67));

        assert_eq!(received.load(Ordering::SeqCst), 2);
        assert!(handler.tracker.state().ctrl_pressed);
    }

    #[test]
    fn test_detached_handler_tracks_ctrl_but_sends_nothing() {
        let manager = KeyListenerManager::new(table());
        let received = Arc::new(AtomicUsize::new(0));
        let calls = Arc::clone(&received);
        manager.attach(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        let mut handler = manager.hook_handler();
        manager.stop();

        handler.on_key_event_guarded(&KeyEvent::down("LEFT CTRL", 162));
        handler.on_key_event_guarded(&KeyEvent::down("C", 67));
        assert_eq!(received.load(Ordering::SeqCst), 0);
        assert!(handler.tracker.state().ctrl_pressed);
    }

    #[test]
    fn test_hook_failure_leaves_monitor_disabled() {
        let manager = KeyListenerManager::new(table());
        record_hook_failure(
            &manager.status,
            &manager.enabled,
            "accessibility permission denied".to_string(),
        );

        manager.start(|_| panic!("disabled monitor must not deliver gestures"));

        match manager.status() {
            MonitorStatus::Disabled(reason) => {
                assert!(reason.contains("accessibility permission denied"))
            }
            other => panic!("expected Disabled, got {:?}", other),
        }
        assert!(!manager.hook_installed.load(Ordering::SeqCst));
        assert!(!manager.enabled.load(Ordering::SeqCst));
        assert!(manager.sink.lock().unwrap().is_none());

        manager.stop();
        assert!(matches!(manager.status(), MonitorStatus::Disabled(_)));
    }
}
