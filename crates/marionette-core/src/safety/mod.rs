//! Safety envelope: kill switch, process allowlist, audit trail.
//!
//! All three are injectable values; nothing here is a global. The UI or
//! CLI layer owns the wiring (hotkeys, signal handlers).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Process-wide emergency stop. Raised by an external input event and
/// checked at the top of every step and before every action dispatch.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    tripped: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }
}

/// Process-wide "automation enabled" toggle. Owned and wired by the
/// embedding layer for its own engines; the flow execution path never
/// consults it (the kill switch is the only in-band stop signal).
#[derive(Debug, Clone)]
pub struct AutomationFlag {
    enabled: Arc<AtomicBool>,
}

impl AutomationFlag {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for AutomationFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Which process images `launch` may start. Empty list permits all.
/// Entries match the full path or the image name, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ProcessAllowlist {
    entries: Vec<String>,
}

impl ProcessAllowlist {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn permits(&self, process_path: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let image = process_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(process_path);
        self.entries.iter().any(|e| {
            e.eq_ignore_ascii_case(process_path) || e.eq_ignore_ascii_case(image)
        })
    }
}

/// Append-only audit trail for safety events. Writes are serialized by
/// a mutex; each record is one line of `<utc> [<event>] <detail>`.
#[derive(Clone, Default)]
pub struct AuditLog {
    inner: Arc<Mutex<Option<PathBuf>>>,
}

impl AuditLog {
    /// An audit log that records to the given file, creating parent
    /// directories on first write.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(path.into()))),
        }
    }

    /// A no-op audit log for contexts with no log directory.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    /// Best-effort append; failures are logged and swallowed so audit
    /// plumbing can never fail a step.
    pub fn record(&self, event: &str, detail: &str) {
        let guard = self.inner.lock().unwrap_or_else(|poison| poison.into_inner());
        let Some(path) = guard.as_ref() else {
            return;
        };
        if let Err(e) = append_line(path, event, detail) {
            tracing::warn!(error = %e, "audit append failed");
        }
    }
}

fn append_line(path: &Path, event: &str, detail: &str) -> anyhow::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
    writeln!(file, "{ts} [{event}] {detail}")?;
    Ok(())
}

/// Audit event names used by the runtime.
pub mod events {
    pub const KILL_SWITCH: &str = "KillSwitch";
    pub const TARGET_LOCK_VIOLATION: &str = "TargetLockViolation";
    pub const ALLOWLIST_REFUSED: &str = "AllowlistRefused";
    pub const VISION_FALLBACK: &str = "VisionFallback";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_switch_round_trip() {
        let ks = KillSwitch::new();
        assert!(!ks.is_tripped());
        ks.trip();
        assert!(ks.is_tripped());
        let clone = ks.clone();
        assert!(clone.is_tripped());
        ks.reset();
        assert!(!clone.is_tripped());
    }

    #[test]
    fn empty_allowlist_permits_everything() {
        let list = ProcessAllowlist::default();
        assert!(list.permits("C:\\Windows\\notepad.exe"));
    }

    #[test]
    fn allowlist_matches_image_name_case_insensitively() {
        let list = ProcessAllowlist::new(vec!["notepad.exe".into()]);
        assert!(list.permits("C:\\Windows\\NOTEPAD.EXE"));
        assert!(list.permits("notepad.exe"));
        assert!(!list.permits("calc.exe"));
    }

    #[test]
    fn audit_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit_log.txt");
        let audit = AuditLog::at(&path);
        audit.record(events::KILL_SWITCH, "engaged by hotkey");
        audit.record(events::VISION_FALLBACK, "step 3");
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[KillSwitch] engaged by hotkey"));
        assert!(lines[1].contains("[VisionFallback] step 3"));
    }

    #[test]
    fn disabled_audit_is_silent() {
        AuditLog::disabled().record("x", "y");
    }
}
