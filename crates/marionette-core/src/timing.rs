//! Poll and settle intervals used by the desktop backend.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// All retry/backoff knobs in one place. Values are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingSettings {
    /// Window polling interval while waiting for the target window.
    pub window_poll_ms: u64,
    /// Element retry interval while resolving a selector.
    pub element_poll_ms: u64,
    /// Gap between the two bounding-box reads of the stability check.
    pub stability_window_ms: u64,
    /// Gap before the single stability retry.
    pub stability_retry_ms: u64,
    /// Per-character cadence when typing through the vision path.
    pub type_char_delay_ms: u64,
    /// Settle time after a click used to focus an element.
    pub post_click_focus_ms: u64,
    /// Delay between emitted key tokens in `send_keys`.
    pub send_key_delay_ms: u64,
    /// Window waits never use a deadline shorter than this.
    pub window_wait_floor_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            window_poll_ms: 300,
            element_poll_ms: 100,
            stability_window_ms: 50,
            stability_retry_ms: 100,
            type_char_delay_ms: 20,
            post_click_focus_ms: 100,
            send_key_delay_ms: 50,
            window_wait_floor_ms: 5000,
        }
    }
}

impl TimingSettings {
    pub fn window_poll(&self) -> Duration {
        Duration::from_millis(self.window_poll_ms)
    }

    pub fn element_poll(&self) -> Duration {
        Duration::from_millis(self.element_poll_ms)
    }

    pub fn stability_window(&self) -> Duration {
        Duration::from_millis(self.stability_window_ms)
    }

    pub fn stability_retry(&self) -> Duration {
        Duration::from_millis(self.stability_retry_ms)
    }

    pub fn type_char_delay(&self) -> Duration {
        Duration::from_millis(self.type_char_delay_ms)
    }

    pub fn post_click_focus(&self) -> Duration {
        Duration::from_millis(self.post_click_focus_ms)
    }

    pub fn send_key_delay(&self) -> Duration {
        Duration::from_millis(self.send_key_delay_ms)
    }

    /// Effective window deadline for a step: `max(timeout_ms, floor)`.
    pub fn window_deadline(&self, step_timeout_ms: i64) -> Duration {
        Duration::from_millis((step_timeout_ms.max(0) as u64).max(self.window_wait_floor_ms))
    }
}
