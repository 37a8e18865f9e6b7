//! Hidden settings unlock: hold `required_fingers` fingers down for
//! `long_press` to open the settings dialog.
//!
//! Purely an observer of raw touch events; the embedded surface still gets
//! every event.

use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

pub type PointerId = i32;

/// Interval of the progress callback while pressing.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEvent {
    Down(PointerId),
    Up(PointerId),
    /// The platform took the gesture away; forget every pointer.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub required_fingers: usize,
    pub long_press: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            required_fingers: 4,
            long_press: Duration::from_millis(3_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Accumulating,
    Pressing,
    /// Fired for this press; needs the finger count to change before it can fire again.
    Triggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureSignal {
    /// Start the progress indicator and its timer.
    PressStarted,
    /// Progress percentage in `0..=100`.
    Progress(u8),
    /// Tear the indicator down without opening settings.
    Aborted,
    OpenSettings,
}

#[derive(Debug)]
pub struct SettingsUnlock {
    config: GestureConfig,
    active_pointers: HashSet<PointerId>,
    press_started: Option<Instant>,
    triggered: bool,
}

impl SettingsUnlock {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            active_pointers: HashSet::new(),
            press_started: None,
            triggered: false,
        }
    }

    pub fn is_pressing(&self) -> bool {
        self.press_started.is_some()
    }

    pub fn active_pointers(&self) -> usize {
        self.active_pointers.len()
    }

    pub fn phase(&self) -> GesturePhase {
        if self.is_pressing() {
            GesturePhase::Pressing
        } else if self.triggered {
            GesturePhase::Triggered
        } else if self.active_pointers.is_empty() {
            GesturePhase::Idle
        } else {
            GesturePhase::Accumulating
        }
    }

    pub fn on_touch(&mut self, event: TouchEvent, now: Instant) -> Option<GestureSignal> {
        let changed = match event {
            TouchEvent::Down(id) => self.active_pointers.insert(id),
            TouchEvent::Up(id) => self.active_pointers.remove(&id),
            TouchEvent::Cancel => {
                self.active_pointers.clear();
                true
            }
        };
        if !changed {
            return None;
        }
        debug!(
            "Touch {:?}, {} pointer(s) down",
            event,
            self.active_pointers.len()
        );

        let count = self.active_pointers.len();
        if count != self.config.required_fingers {
            self.triggered = false;
            if self.press_started.take().is_some() {
                debug!("Settings gesture aborted");
                return Some(GestureSignal::Aborted);
            }
            return None;
        }

        self.press_started = Some(now);
        Some(GestureSignal::PressStarted)
    }

    /// Periodic progress callback. Fires [`GestureSignal::OpenSettings`] once
    /// the press has lasted long enough.
    pub fn on_tick(&mut self, now: Instant) -> Option<GestureSignal> {
        let started = self.press_started?;
        let elapsed = now.saturating_duration_since(started);

        if elapsed >= self.config.long_press {
            info!("Settings gesture completed");
            self.press_started = None;
            self.triggered = true;
            return Some(GestureSignal::OpenSettings);
        }

        Some(GestureSignal::Progress(self.progress_for(elapsed)))
    }

    fn progress_for(&self, elapsed: Duration) -> u8 {
        let total = self.config.long_press.as_millis().max(1);
        (elapsed.as_millis() * 100 / total).min(100) as u8
    }
}
