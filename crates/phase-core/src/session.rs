use crate::error::{PhaseError, Result};
use crate::io;
use crate::paths;
use crate::types::{PhaseRef, TestsStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// One working session inside a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub phase: PhaseRef,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files_touched: BTreeSet<PathBuf>,
    #[serde(default)]
    pub tests: TestsStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub sealed: bool,
}

impl SessionRecord {
    pub fn open(phase: PhaseRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            started_at: Utc::now(),
            ended_at: None,
            files_touched: BTreeSet::new(),
            tests: TestsStatus::NotRun,
            summary: String::new(),
            sealed: false,
        }
    }

    /// Add touched files and, when given, the latest test outcome.
    pub fn record(&mut self, files: impl IntoIterator<Item = PathBuf>, tests: Option<TestsStatus>) {
        self.files_touched.extend(files);
        if let Some(t) = tests {
            self.tests = t;
        }
    }

    pub fn seal(&mut self, tests: TestsStatus, summary: &str) {
        self.tests = tests;
        self.summary = summary.trim().to_string();
        self.ended_at = Some(Utc::now());
        self.sealed = true;
    }
}

// ---------------------------------------------------------------------------
// SessionLog
// ---------------------------------------------------------------------------

/// A sealed record together with its position in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedSession {
    pub number: u32,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// The open session (`.phase/session.yaml`) plus the append-only log of
/// sealed ones (`.phase/sessions/NNNN-<phase>.yaml`).
#[derive(Debug, Clone)]
pub struct SessionLog {
    root: PathBuf,
}

impl SessionLog {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn open_session(&self) -> Result<Option<SessionRecord>> {
        let path = paths::open_session_path(&self.root);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(Some(serde_yaml::from_str(&data)?))
    }

    pub fn require_open(&self) -> Result<SessionRecord> {
        self.open_session()?.ok_or(PhaseError::NoOpenSession)
    }

    pub fn save_open(&self, record: &SessionRecord) -> Result<()> {
        let data = serde_yaml::to_string(record)?;
        io::atomic_write(&paths::open_session_path(&self.root), data.as_bytes())
    }

    /// Append a sealed record to the log and drop the open-session file.
    pub fn append_sealed(&self, record: &SessionRecord) -> Result<LoggedSession> {
        if !record.sealed {
            return Err(PhaseError::InvalidValue(format!(
                "session {} is not sealed",
                record.id
            )));
        }
        let number = self.next_number()?;
        let path = paths::sessions_dir(&self.root)
            .join(format!("{number:04}-{}.yaml", record.phase.label()));
        let data = serde_yaml::to_string(record)?;
        io::atomic_write(&path, data.as_bytes())?;

        let open = paths::open_session_path(&self.root);
        if open.exists() {
            std::fs::remove_file(&open)?;
        }
        tracing::info!(
            session = number,
            phase = %record.phase.label(),
            tests = %record.tests,
            "session sealed"
        );
        Ok(LoggedSession {
            number,
            record: record.clone(),
        })
    }

    fn next_number(&self) -> Result<u32> {
        Ok(self.numbered_files()?.last().map(|(n, _)| n + 1).unwrap_or(1))
    }

    fn numbered_files(&self) -> Result<Vec<(u32, PathBuf)>> {
        let dir = paths::sessions_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(stem) = name.strip_suffix(".yaml") else {
                continue;
            };
            let Some((num, _)) = stem.split_once('-') else {
                continue;
            };
            if let Ok(n) = num.parse::<u32>() {
                files.push((n, entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Every sealed session, oldest first.
    pub fn list(&self) -> Result<Vec<LoggedSession>> {
        self.numbered_files()?
            .into_iter()
            .map(|(number, path)| {
                let data = std::fs::read_to_string(&path)?;
                Ok(LoggedSession {
                    number,
                    record: serde_yaml::from_str(&data)?,
                })
            })
            .collect()
    }

    pub fn for_phase(&self, index: u32) -> Result<Vec<LoggedSession>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|s| s.record.phase.index == index)
            .collect())
    }

    pub fn latest(&self) -> Result<Option<LoggedSession>> {
        Ok(self.list()?.pop())
    }

    /// Union of files touched by every sealed session of a phase.
    pub fn files_touched_in(&self, index: u32) -> Result<BTreeSet<PathBuf>> {
        Ok(self
            .for_phase(index)?
            .into_iter()
            .flat_map(|s| s.record.files_touched)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PhaseStatus;
    use tempfile::TempDir;

    fn in_progress(index: u32) -> PhaseRef {
        PhaseRef::planned(index).with_status(PhaseStatus::InProgress)
    }

    #[test]
    fn open_session_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());
        assert!(log.open_session().unwrap().is_none());
        assert!(matches!(log.require_open(), Err(PhaseError::NoOpenSession)));

        let mut rec = SessionRecord::open(in_progress(0));
        rec.record([PathBuf::from("app/main.py")], Some(TestsStatus::Failing));
        log.save_open(&rec).unwrap();
        assert_eq!(log.open_session().unwrap(), Some(rec));
    }

    #[test]
    fn record_unions_files() {
        let mut rec = SessionRecord::open(in_progress(1));
        rec.record([PathBuf::from("a.py"), PathBuf::from("b.py")], None);
        rec.record([PathBuf::from("a.py")], None);
        assert_eq!(rec.files_touched.len(), 2);
        assert_eq!(rec.tests, TestsStatus::NotRun);
    }

    #[test]
    fn sealing_appends_numbered_files() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());

        for (phase, summary) in [(0, "skeleton up"), (1, "users"), (1, "users tests")] {
            let mut rec = SessionRecord::open(in_progress(phase));
            rec.record([PathBuf::from(format!("f{phase}.py"))], None);
            log.save_open(&rec).unwrap();
            rec.seal(TestsStatus::Passing, summary);
            log.append_sealed(&rec).unwrap();
            assert!(log.open_session().unwrap().is_none());
        }

        assert!(dir.path().join(".phase/sessions/0001-skeleton.yaml").exists());
        assert!(dir.path().join(".phase/sessions/0003-implementation-1.yaml").exists());

        let all = log.list().unwrap();
        assert_eq!(all.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(log.for_phase(1).unwrap().len(), 2);
        assert_eq!(log.latest().unwrap().unwrap().record.summary, "users tests");
        assert_eq!(
            log.files_touched_in(1).unwrap(),
            BTreeSet::from([PathBuf::from("f1.py")])
        );
    }

    #[test]
    fn unsealed_record_cannot_be_appended() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());
        let rec = SessionRecord::open(in_progress(0));
        assert!(log.append_sealed(&rec).is_err());
    }
}
