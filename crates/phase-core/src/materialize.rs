use crate::config::Config;
use crate::context::{ContextPatch, ProjectContext};
use crate::error::{PhaseError, Result};
use crate::io;
use crate::lock::ContextLock;
use crate::paths;
use crate::resolver::ResolvedRuleSet;
use crate::rule::{self, RuleSource};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reads and writes `.phase/context.md` and `.phase/rules/` for one project.
#[derive(Debug, Clone)]
pub struct Materializer {
    root: PathBuf,
    lock_timeout: Duration,
}

impl Materializer {
    pub fn new(root: &Path, config: &Config) -> Self {
        Self {
            root: root.to_path_buf(),
            lock_timeout: Duration::from_millis(config.lock.timeout_ms),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        paths::context_path(&self.root).is_file()
    }

    /// Write the whole artifact. Rendering is deterministic, so writing the
    /// same context twice leaves identical bytes.
    pub fn write(&self, ctx: &ProjectContext) -> Result<()> {
        ctx.validate()?;
        let _lock = ContextLock::acquire(&self.root, self.lock_timeout)?;
        self.write_unlocked(ctx)
    }

    pub fn read(&self) -> Result<ProjectContext> {
        let path = paths::context_path(&self.root);
        if !path.is_file() {
            return Err(PhaseError::NotInitialized);
        }
        ProjectContext::parse(&std::fs::read_to_string(&path)?)
    }

    /// Locked read-modify-write touching only the fields present in `patch`.
    pub fn update(&self, patch: ContextPatch) -> Result<ProjectContext> {
        self.transact(|ctx| {
            patch.apply(ctx);
            Ok(ctx.clone())
        })
    }

    /// Run `f` against the current context while holding the lock, writing
    /// the context back only if `f` succeeded and changed it.
    pub fn transact<T>(&self, f: impl FnOnce(&mut ProjectContext) -> Result<T>) -> Result<T> {
        let _lock = ContextLock::acquire(&self.root, self.lock_timeout)?;
        let mut ctx = self.read()?;
        let before = ctx.clone();
        let out = f(&mut ctx)?;
        if ctx != before {
            ctx.validate()?;
            self.write_unlocked(&ctx)?;
        }
        Ok(out)
    }

    fn write_unlocked(&self, ctx: &ProjectContext) -> Result<()> {
        let path = paths::context_path(&self.root);
        let rendered = ctx.render();
        if std::fs::read_to_string(&path).is_ok_and(|existing| existing == rendered) {
            return Ok(());
        }
        io::atomic_write(&path, rendered.as_bytes())?;
        tracing::debug!(
            stack = %ctx.active_stack,
            phase = %ctx.active_phase,
            "context written"
        );
        Ok(())
    }

    /// Mirror resolved rules into `.phase/rules/`, one file per rule, each
    /// tagged with `mirroredFrom` so the resolver never reads it back as a
    /// project rule. Copies of rules that are no longer included are removed.
    /// Hand-written files are left alone. Returns the paths written.
    pub fn write_rules(&self, resolved: &ResolvedRuleSet) -> Result<Vec<PathBuf>> {
        let dir = paths::rules_dir(&self.root);
        io::ensure_dir(&dir)?;
        let local = RuleSource::Project(PathBuf::from(paths::RULES_DIR));
        let mut wanted = BTreeMap::new();
        for rule in resolved.rules.iter().filter(|r| r.source != local) {
            wanted.insert(dir.join(rule.filename()), rule.render_mirror()?);
        }

        let mut removed = 0usize;
        for path in rule::mirrored_files(&dir)? {
            if !wanted.contains_key(&path) {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }

        let mut written = Vec::new();
        for (path, rendered) in wanted {
            if let Ok(existing) = std::fs::read_to_string(&path) {
                if existing == rendered || rule::mirror_origin(&existing).is_none() {
                    continue;
                }
            }
            io::atomic_write(&path, rendered.as_bytes())?;
            written.push(path);
        }
        tracing::debug!(written = written.len(), removed, "rules materialized");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::merge;
    use crate::rule::{self, RuleDocument, RuleId};
    use crate::stack::{StackContext, StackDefinition};
    use crate::types::{PhaseRef, PhaseStatus, Strictness};
    use tempfile::TempDir;

    fn context() -> ProjectContext {
        ProjectContext::new(&StackDefinition::new(
            "go-gin",
            StackContext {
                language: "Go".to_string(),
                framework: Some("Gin".to_string()),
                ..StackContext::default()
            },
        ))
    }

    #[test]
    fn read_before_write_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        assert!(matches!(m.read(), Err(PhaseError::NotInitialized)));
    }

    #[test]
    fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        m.write(&context()).unwrap();
        assert_eq!(m.read().unwrap(), context());
    }

    #[test]
    fn write_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        m.write(&context()).unwrap();
        let first = std::fs::read(paths::context_path(dir.path())).unwrap();
        m.write(&context()).unwrap();
        let second = std::fs::read(paths::context_path(dir.path())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn update_changes_only_patched_fields() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        m.write(&context()).unwrap();
        let updated = m.update(ContextPatch::strictness(Strictness::High)).unwrap();
        let mut expected = context();
        expected.strictness = Strictness::High;
        assert_eq!(updated, expected);
        assert_eq!(m.read().unwrap(), expected);

        let phase = PhaseRef::skeleton().with_status(PhaseStatus::InProgress);
        m.update(ContextPatch::active_phase(phase)).unwrap();
        let now = m.read().unwrap();
        assert_eq!(now.strictness, Strictness::High);
        assert_eq!(now.active_phase, phase);
    }

    #[test]
    fn update_fails_while_locked() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.lock.timeout_ms = 50;
        let m = Materializer::new(dir.path(), &config);
        m.write(&context()).unwrap();

        let _held = ContextLock::acquire(dir.path(), Duration::from_millis(50)).unwrap();
        let err = m.update(ContextPatch::strictness(Strictness::Low)).unwrap_err();
        assert!(matches!(err, PhaseError::ContextLocked { .. }));
        assert_eq!(m.read().unwrap().strictness, Strictness::Medium);
    }

    fn stack_rules(stack: &str, rules: &[(&str, &str)]) -> ResolvedRuleSet {
        let src = RuleSource::Stack(stack.to_string());
        let layer = rules
            .iter()
            .map(|(id, body)| RuleDocument::new(RuleId::parse(id).unwrap(), *body, src.clone()))
            .collect();
        merge(stack, vec![layer], &[]).unwrap()
    }

    #[test]
    fn write_rules_mirrors_and_parses_back() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        let src = RuleSource::Stack("go-gin".to_string());
        let resolved = merge(
            "go-gin",
            vec![vec![
                RuleDocument::new(RuleId::parse("100-style").unwrap(), "gofmt\n", src.clone()),
                RuleDocument::new(RuleId::parse("300-tests").unwrap(), "table tests\n", src)
                    .with_glob("**/*_test.go"),
            ]],
            &[PathBuf::from("internal/users/repo_test.go")],
        )
        .unwrap();

        let written = m.write_rules(&resolved).unwrap();
        assert_eq!(written.len(), 2);
        assert!(m.write_rules(&resolved).unwrap().is_empty());

        let rules_dir = paths::rules_dir(dir.path());
        let path = rules_dir.join("300-tests.md");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(rule::mirror_origin(&content).as_deref(), Some("stack:go-gin"));
        let parsed = RuleDocument::parse(&path, &content, resolved.rules[1].source.clone()).unwrap();
        assert!(parsed.same_content(&resolved.rules[1]));
        assert_eq!(parsed.glob.as_deref(), Some("**/*_test.go"));

        // Copies are output, not a rule layer.
        let local = RuleSource::Project(PathBuf::from(paths::RULES_DIR));
        assert!(rule::load_dir(&rules_dir, local).unwrap().is_empty());
    }

    #[test]
    fn write_rules_drops_copies_of_a_previous_stack() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        m.write_rules(&stack_rules(
            "python-fastapi",
            &[("100-style", "PEP 8\n"), ("400-api", "typed models\n")],
        ))
        .unwrap();

        let rules_dir = paths::rules_dir(dir.path());
        std::fs::write(rules_dir.join("900-team.md"), "hand written\n").unwrap();

        m.write_rules(&stack_rules("node-express", &[("100-style", "prettier\n")]))
            .unwrap();
        assert!(!rules_dir.join("400-api.md").exists());
        let style = std::fs::read_to_string(rules_dir.join("100-style.md")).unwrap();
        assert!(style.contains("prettier"));
        assert_eq!(rule::mirror_origin(&style).as_deref(), Some("stack:node-express"));
        assert_eq!(
            std::fs::read_to_string(rules_dir.join("900-team.md")).unwrap(),
            "hand written\n"
        );
    }

    #[test]
    fn write_rules_never_overwrites_hand_written_files() {
        let dir = TempDir::new().unwrap();
        let m = Materializer::new(dir.path(), &Config::default());
        let rules_dir = paths::rules_dir(dir.path());
        std::fs::create_dir_all(&rules_dir).unwrap();
        std::fs::write(rules_dir.join("100-style.md"), "PEP 8\n").unwrap();

        let written = m
            .write_rules(&stack_rules("python-fastapi", &[("100-style", "PEP 8\n")]))
            .unwrap();
        assert!(written.is_empty());
        assert_eq!(
            std::fs::read_to_string(rules_dir.join("100-style.md")).unwrap(),
            "PEP 8\n"
        );
    }
}
