//! Phase and session lifecycle.
//!
//! A project moves through its phases strictly in order: the skeleton
//! (index 0) first, then implementation phases 1..N. Only the active phase
//! is stored; everything before it is complete by construction. Work happens
//! in sessions: a session is opened inside the active phase, accumulates the
//! files it touched and the latest test outcome, and is sealed into the
//! append-only log. A phase completes only when its latest sealed session
//! passed with a summary and every planned deliverable was touched.

use crate::error::{PhaseError, Result};
use crate::materialize::Materializer;
use crate::paths;
use crate::session::{LoggedSession, SessionLog, SessionRecord};
use crate::types::{label_for, PhaseRef, PhaseStatus, TestsStatus};
use globset::GlobBuilder;
use std::path::{Path, PathBuf};

pub struct PhaseMachine {
    materializer: Materializer,
    log: SessionLog,
}

impl PhaseMachine {
    pub fn new(materializer: Materializer) -> Self {
        let log = SessionLog::new(materializer.root());
        Self { materializer, log }
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Begin (or resume) phase `index`, defaulting to the active phase, and
    /// open a session in it.
    pub fn start(&self, index: Option<u32>) -> Result<SessionRecord> {
        self.materializer.transact(|ctx| {
            let active = ctx.active_phase;
            let target = index.unwrap_or(active.index);
            if !ctx.plan.is_empty() && target as usize >= ctx.plan.len() {
                return Err(PhaseError::PhaseNotFound(target));
            }
            let refuse = |reason: String| PhaseError::InvalidTransition {
                from: active.to_string(),
                to: label_for(target),
                reason,
            };
            if target != active.index {
                return Err(refuse(match active.status {
                    PhaseStatus::InProgress => {
                        format!("{} is in progress; complete it first", active.label())
                    }
                    _ if target > active.index => format!(
                        "phases advance one at a time; the next phase is {}",
                        active.label()
                    ),
                    _ => format!("{} is already complete", label_for(target)),
                }));
            }
            if active.status == PhaseStatus::Complete {
                return Err(refuse("every planned phase is complete".to_string()));
            }
            if let Some(open) = self.log.open_session()? {
                return Err(PhaseError::SessionAlreadyOpen(open.phase.label()));
            }

            ctx.active_phase = active.with_status(PhaseStatus::InProgress);
            let session = SessionRecord::open(ctx.active_phase);
            self.log.save_open(&session)?;
            tracing::info!(phase = %ctx.active_phase.label(), session = %session.id, "session started");
            Ok(session)
        })
    }

    /// Add touched files (project-relative or absolute under the root) and an
    /// optional test outcome to the open session. Never changes phase state.
    pub fn record_activity(&self, files: &[PathBuf], tests: Option<TestsStatus>) -> Result<SessionRecord> {
        let root = self.materializer.root().to_path_buf();
        self.materializer.transact(|_| {
            let mut session = self.log.require_open()?;
            session.record(files.iter().map(|f| normalize(&root, f)), tests);
            self.log.save_open(&session)?;
            Ok(session)
        })
    }

    /// Seal the open session into the log.
    pub fn end_session(&self, tests: TestsStatus, summary: &str) -> Result<LoggedSession> {
        self.materializer.transact(|_| {
            let mut session = self.log.require_open()?;
            session.seal(tests, summary);
            self.log.append_sealed(&session)
        })
    }

    /// Complete phase `index` (default: the active one) and advance.
    pub fn complete(&self, index: Option<u32>) -> Result<PhaseRef> {
        self.materializer.transact(|ctx| {
            let active = ctx.active_phase;
            let target = index.unwrap_or(active.index);
            if !ctx.plan.is_empty() && target as usize >= ctx.plan.len() {
                return Err(PhaseError::PhaseNotFound(target));
            }
            if target != active.index || active.status != PhaseStatus::InProgress {
                return Err(PhaseError::InvalidTransition {
                    from: active.to_string(),
                    to: format!("{} (complete)", label_for(target)),
                    reason: format!("{} is not in progress", label_for(target)),
                });
            }

            let mut unmet = Vec::new();
            if let Some(open) = self.log.open_session()? {
                unmet.push(format!("session {} is still open", open.id));
            }
            match self.log.for_phase(target)?.last() {
                None => unmet.push("no sealed session for this phase".to_string()),
                Some(latest) => {
                    if latest.record.tests != TestsStatus::Passing {
                        unmet.push(format!("latest session tests are {}", latest.record.tests));
                    }
                    if latest.record.summary.trim().is_empty() {
                        unmet.push("latest session has an empty summary".to_string());
                    }
                }
            }
            if let Some(planned) = ctx.planned(target) {
                let touched: Vec<String> = self
                    .log
                    .files_touched_in(target)?
                    .iter()
                    .map(|p| paths::relative_slash(Path::new(""), p))
                    .collect();
                for deliverable in &planned.deliverables {
                    let matcher = GlobBuilder::new(deliverable).build()?.compile_matcher();
                    if !touched.iter().any(|t| matcher.is_match(t)) {
                        unmet.push(format!("deliverable '{deliverable}' was not touched"));
                    }
                }
            }
            if !unmet.is_empty() {
                return Err(PhaseError::IncompletePhase {
                    phase: active.label(),
                    unmet,
                });
            }

            let next = target + 1;
            ctx.active_phase = if !ctx.plan.is_empty() && next as usize >= ctx.plan.len() {
                active.with_status(PhaseStatus::Complete)
            } else {
                PhaseRef::planned(next)
            };
            tracing::info!(completed = %active.label(), active = %ctx.active_phase, "phase completed");
            Ok(ctx.active_phase)
        })
    }
}

/// Project-relative form of a recorded path. Absolute paths may spell the
/// root through a symlink, so the canonical root is tried as well.
fn normalize(root: &Path, file: &Path) -> PathBuf {
    let canonical = root.canonicalize().ok();
    let base = canonical
        .as_deref()
        .filter(|c| !file.starts_with(root) && file.starts_with(c))
        .unwrap_or(root);
    PathBuf::from(paths::relative_slash(base, file))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::{PlannedPhase, ProjectContext};
    use crate::stack::{StackContext, StackDefinition};
    use tempfile::TempDir;

    fn setup(plan: Vec<PlannedPhase>) -> (TempDir, PhaseMachine) {
        let dir = TempDir::new().unwrap();
        let materializer = Materializer::new(dir.path(), &Config::default());
        let mut ctx = ProjectContext::new(&StackDefinition::new(
            "python-fastapi",
            StackContext {
                language: "Python".to_string(),
                ..StackContext::default()
            },
        ));
        ctx.plan = plan;
        materializer.write(&ctx).unwrap();
        (dir, PhaseMachine::new(materializer))
    }

    fn plan() -> Vec<PlannedPhase> {
        vec![
            PlannedPhase {
                title: "Skeleton".to_string(),
                deliverables: vec!["app/main.py".to_string()],
            },
            PlannedPhase {
                title: "Users".to_string(),
                deliverables: vec!["app/modules/users/**".to_string()],
            },
        ]
    }

    fn active(m: &PhaseMachine) -> PhaseRef {
        m.materializer.read().unwrap().active_phase
    }

    #[test]
    fn skeleton_is_startable_on_fresh_project() {
        let (_dir, m) = setup(vec![]);
        let session = m.start(None).unwrap();
        assert_eq!(session.phase.index, 0);
        assert_eq!(active(&m).status, PhaseStatus::InProgress);
    }

    #[test]
    fn cannot_skip_ahead() {
        let (_dir, m) = setup(vec![]);
        let err = m.start(Some(2)).unwrap_err();
        assert!(matches!(err, PhaseError::InvalidTransition { .. }));
        assert_eq!(active(&m), PhaseRef::skeleton());
    }

    #[test]
    fn cannot_start_another_phase_while_one_is_in_progress() {
        let (_dir, m) = setup(vec![]);
        m.start(Some(0)).unwrap();
        m.end_session(TestsStatus::Passing, "done").unwrap();
        let err = m.start(Some(1)).unwrap_err();
        match err {
            PhaseError::InvalidTransition { reason, .. } => assert!(reason.contains("in progress")),
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn second_session_while_open_is_rejected() {
        let (_dir, m) = setup(vec![]);
        m.start(None).unwrap();
        assert!(matches!(m.start(None), Err(PhaseError::SessionAlreadyOpen(_))));
    }

    #[test]
    fn phase_beyond_plan_is_not_found() {
        let (_dir, m) = setup(plan());
        assert!(matches!(m.start(Some(7)), Err(PhaseError::PhaseNotFound(7))));
    }

    #[test]
    fn record_without_session_fails() {
        let (_dir, m) = setup(vec![]);
        assert!(matches!(
            m.record_activity(&[PathBuf::from("a.py")], None),
            Err(PhaseError::NoOpenSession)
        ));
    }

    #[test]
    fn record_normalizes_absolute_paths() {
        let (dir, m) = setup(vec![]);
        m.start(None).unwrap();
        let abs = dir.path().join("app").join("main.py");
        let session = m.record_activity(&[abs], Some(TestsStatus::Failing)).unwrap();
        assert!(session.files_touched.contains(&PathBuf::from("app/main.py")));
        assert_eq!(session.tests, TestsStatus::Failing);
        assert_eq!(active(&m).status, PhaseStatus::InProgress);
    }

    #[test]
    fn dot_prefixed_paths_satisfy_deliverables() {
        let (_dir, m) = setup(plan());
        m.start(None).unwrap();
        let session = m
            .record_activity(&[PathBuf::from("./app/main.py")], None)
            .unwrap();
        assert!(session.files_touched.contains(&PathBuf::from("app/main.py")));
        m.end_session(TestsStatus::Passing, "skeleton runs").unwrap();
        assert_eq!(m.complete(None).unwrap(), PhaseRef::planned(1));
    }

    #[test]
    fn failing_tests_block_completion() {
        let (_dir, m) = setup(vec![]);
        m.start(None).unwrap();
        m.record_activity(&[PathBuf::from("app/main.py")], None).unwrap();
        m.end_session(TestsStatus::Failing, "half done").unwrap();
        match m.complete(None) {
            Err(PhaseError::IncompletePhase { phase, unmet }) => {
                assert_eq!(phase, "skeleton");
                assert!(unmet.iter().any(|u| u.contains("failing")));
            }
            other => panic!("expected IncompletePhase, got {other:?}"),
        }
        assert_eq!(active(&m).status, PhaseStatus::InProgress);
    }

    #[test]
    fn open_session_blocks_completion() {
        let (_dir, m) = setup(vec![]);
        m.start(None).unwrap();
        m.end_session(TestsStatus::Passing, "ok").unwrap();
        m.start(None).unwrap();
        assert!(matches!(m.complete(None), Err(PhaseError::IncompletePhase { .. })));
    }

    #[test]
    fn deliverables_must_be_touched() {
        let (_dir, m) = setup(plan());
        m.start(None).unwrap();
        m.record_activity(&[PathBuf::from("README.md")], None).unwrap();
        m.end_session(TestsStatus::Passing, "scaffolded").unwrap();
        match m.complete(None) {
            Err(PhaseError::IncompletePhase { unmet, .. }) => {
                assert_eq!(unmet, vec!["deliverable 'app/main.py' was not touched"]);
            }
            other => panic!("expected IncompletePhase, got {other:?}"),
        }
    }

    #[test]
    fn full_plan_walkthrough() {
        let (_dir, m) = setup(plan());
        m.start(None).unwrap();
        m.record_activity(&[PathBuf::from("app/main.py")], Some(TestsStatus::Passing)).unwrap();
        m.end_session(TestsStatus::Passing, "skeleton runs").unwrap();
        assert_eq!(m.complete(None).unwrap(), PhaseRef::planned(1));

        // The skeleton is now behind us.
        assert!(matches!(m.start(Some(0)), Err(PhaseError::InvalidTransition { .. })));

        m.start(Some(1)).unwrap();
        m.record_activity(&[PathBuf::from("app/modules/users/router.py")], None).unwrap();
        m.end_session(TestsStatus::Passing, "users CRUD").unwrap();
        let done = m.complete(Some(1)).unwrap();
        assert_eq!(done.index, 1);
        assert_eq!(done.status, PhaseStatus::Complete);

        assert!(matches!(m.start(None), Err(PhaseError::InvalidTransition { .. })));
        assert!(matches!(m.start(Some(2)), Err(PhaseError::PhaseNotFound(2))));
    }
}
