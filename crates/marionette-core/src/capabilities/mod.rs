//! Low-level capabilities the desktop backend drives.
//!
//! Each trait is a thin seam over a shared OS resource (accessibility
//! tree, input synthesis, screen capture, process list). Production
//! bindings live outside this crate; `fake` ships scriptable in-memory
//! implementations for tests and the demo backend.

pub mod fake;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::model::{Bounds, ScrollDirection};

/// Opaque top-level window handle (HWND-shaped).
pub type WindowId = u64;
/// Opaque element handle within a window's subtree.
pub type ElementId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    /// Owning process image name without path, e.g. "notepad.exe".
    pub process_name: String,
    pub pid: u32,
    pub bounds: Bounds,
}

/// Element facts as read from the accessibility tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementProps {
    pub id: ElementId,
    pub control_type: String,
    pub name: String,
    pub automation_id: String,
    pub bounds: Bounds,
    pub enabled: bool,
    pub offscreen: bool,
    /// Read-only flag of the value pattern, when the element has one.
    pub value_read_only: Option<bool>,
    /// OS-suggested click point, when available.
    pub clickable_point: Option<(i32, i32)>,
}

/// The accessibility surface. All reads are point-in-time; callers that
/// need stability read twice.
pub trait UiTree: Send + Sync {
    fn windows(&self) -> anyhow::Result<Vec<WindowInfo>>;

    /// Re-read one window; `None` when it no longer exists.
    fn window(&self, id: WindowId) -> anyhow::Result<Option<WindowInfo>>;

    /// Direct children of `parent` (or of the window root when `None`).
    fn children(&self, window: WindowId, parent: Option<ElementId>)
        -> anyhow::Result<Vec<ElementId>>;

    fn props(&self, element: ElementId) -> anyhow::Result<ElementProps>;

    /// Invoke-pattern activation. `Ok(false)` when the element has no
    /// invoke pattern; callers then fall back to a synthesized click.
    fn invoke(&self, element: ElementId) -> anyhow::Result<bool>;

    fn focus(&self, element: ElementId) -> anyhow::Result<()>;

    fn set_foreground(&self, window: WindowId) -> anyhow::Result<()>;

    /// Current text of an element (value pattern, else accessible name).
    fn element_text(&self, element: ElementId) -> anyhow::Result<String>;
}

pub trait InputSynthesizer: Send + Sync {
    fn click_at(&self, x: i32, y: i32) -> anyhow::Result<()>;
    fn move_to(&self, x: i32, y: i32) -> anyhow::Result<()>;
    fn wheel(&self, direction: ScrollDirection, ticks: i64) -> anyhow::Result<()>;
    fn send_char(&self, c: char) -> anyhow::Result<()>;
    /// Press all modifiers, press and release the main key, release all
    /// modifiers.
    fn send_chord(&self, modifiers: &[&str], key: &str) -> anyhow::Result<()>;
}

pub trait ScreenCapture: Send + Sync {
    /// PNG bytes of the region, or of the full virtual screen when
    /// `None`.
    fn capture_region(&self, region: Option<Bounds>) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub path: String,
}

pub trait ProcessEnumerator: Send + Sync {
    fn processes(&self) -> anyhow::Result<Vec<ProcessInfo>>;
    /// Spawn a process image; returns the new pid.
    fn spawn(&self, path: &str) -> anyhow::Result<u32>;
    /// Shell-open a URL or document with the default handler.
    fn shell_open(&self, target: &str) -> anyhow::Result<()>;
    fn is_running(&self, name: &str) -> anyhow::Result<bool>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Async sleep seam. Poll loops go through this so tests can run them
/// instantly.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeps complete immediately; retry loops still observe elapsed time
/// through their own deadline arithmetic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSleeper;

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, _duration: Duration) {
        tokio::task::yield_now().await;
    }
}
