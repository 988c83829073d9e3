//! Report persistence: timestamped run directories under `reports/`.
//!
//! Writes are run-scoped and never overwrite prior runs; a name
//! collision within the same second gets a numeric suffix.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capabilities::{Clock, SystemClock};
use crate::model::{ExecutionReport, PackReport};

pub const FLOW_REPORT_FILE: &str = "report.json";
pub const PACK_REPORT_FILE: &str = "pack-report.json";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub name: String,
    pub path: String,
    pub is_pack: bool,
}

#[derive(Clone)]
pub struct ReportStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl ReportStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `reports/<name>_<yyyyMMdd_HHmmss>/`, uniquified on
    /// collision.
    pub fn create_run_dir(&self, name: &str) -> anyhow::Result<PathBuf> {
        let stamp = self.clock.now().format("%Y%m%d_%H%M%S");
        let base = format!("{}_{stamp}", sanitize(name));
        let mut dir = self.root.join(&base);
        let mut n = 1;
        while dir.exists() {
            dir = self.root.join(format!("{base}_{n}"));
            n += 1;
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn write_flow_report(
        &self,
        dir: &Path,
        report: &ExecutionReport,
    ) -> anyhow::Result<PathBuf> {
        write_json(&dir.join(FLOW_REPORT_FILE), report)
    }

    pub fn write_pack_report(&self, dir: &Path, report: &PackReport) -> anyhow::Result<PathBuf> {
        write_json(&dir.join(PACK_REPORT_FILE), report)
    }

    /// Run directories, newest first (directory names embed the
    /// timestamp, so lexicographic order within a name is temporal; we
    /// sort by modification time to interleave different names).
    pub fn list_reports(&self, max: usize) -> anyhow::Result<Vec<ReportEntry>> {
        let mut entries: Vec<(std::time::SystemTime, ReportEntry)> = Vec::new();
        let Ok(read) = std::fs::read_dir(&self.root) else {
            return Ok(Vec::new());
        };
        for dir_entry in read.flatten() {
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name.starts_with('_') {
                // Internal dirs (_vision, _pack artifacts).
                continue;
            }
            let is_pack = path.join(PACK_REPORT_FILE).exists();
            if !is_pack && !path.join(FLOW_REPORT_FILE).exists() {
                continue;
            }
            let modified = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            entries.push((
                modified,
                ReportEntry {
                    name,
                    path: path.display().to_string(),
                    is_pack,
                },
            ));
        }
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, e)| e).take(max).collect())
    }

    /// The most recent pack report, if any run produced one.
    pub fn latest_pack_report(&self) -> anyhow::Result<Option<PackReport>> {
        for entry in self.list_reports(usize::MAX)? {
            if !entry.is_pack {
                continue;
            }
            let content =
                std::fs::read_to_string(Path::new(&entry.path).join(PACK_REPORT_FILE))?;
            return Ok(Some(serde_json::from_str(&content)?));
        }
        Ok(None)
    }

    /// The most recent flow report, if any.
    pub fn latest_flow_report(&self) -> anyhow::Result<Option<ExecutionReport>> {
        for entry in self.list_reports(usize::MAX)? {
            if entry.is_pack {
                continue;
            }
            let content =
                std::fs::read_to_string(Path::new(&entry.path).join(FLOW_REPORT_FILE))?;
            return Ok(Some(serde_json::from_str(&content)?));
        }
        Ok(None)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(path.to_path_buf())
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "run".to_string()
    } else {
        cleaned
    }
}

/// Fixed clock for deterministic directory names in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlowVerdict, MachineInfo};

    fn report(name: &str) -> ExecutionReport {
        ExecutionReport {
            schema_version: 1,
            test_name: name.into(),
            result: FlowVerdict::Passed,
            total_time_ms: 1,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            backend_used: "desktop".into(),
            backend_version: "1".into(),
            machine_info: MachineInfo::capture(),
            steps: vec![],
            summary: "ok".into(),
        }
    }

    #[test]
    fn run_dirs_are_timestamped_and_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let fixed = FixedClock("2026-08-01T10:30:00Z".parse().unwrap());
        let store = ReportStore::new(tmp.path()).with_clock(Arc::new(fixed));

        let first = store.create_run_dir("My Flow!").unwrap();
        let second = store.create_run_dir("My Flow!").unwrap();
        assert!(first.ends_with("My_Flow__20260801_103000"));
        assert_ne!(first, second);
    }

    #[test]
    fn listing_finds_written_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        let dir = store.create_run_dir("smoke").unwrap();
        store.write_flow_report(&dir, &report("smoke")).unwrap();

        let entries = store.list_reports(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_pack);

        let latest = store.latest_flow_report().unwrap().unwrap();
        assert_eq!(latest.test_name, "smoke");
    }

    #[test]
    fn internal_dirs_are_hidden_from_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ReportStore::new(tmp.path());
        std::fs::create_dir_all(tmp.path().join("_vision")).unwrap();
        assert!(store.list_reports(10).unwrap().is_empty());
    }
}
