use crate::config::RulesConfig;
use crate::error::Result;
use crate::paths;
use crate::registry::Registry;
use crate::rule::{self, sort_rules, RuleDocument, RuleId, RuleSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A later-loaded rule replaced an earlier one with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOverride {
    pub id: RuleId,
    pub winner: RuleSource,
    pub loser: RuleSource,
}

/// A rule that was loaded but not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub id: RuleId,
    pub source: RuleSource,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRuleSet {
    pub stack: String,
    /// Included rules, ascending by id, at most one per id.
    pub rules: Vec<RuleDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<RuleOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedRule>,
}

impl ResolvedRuleSet {
    /// Rules that apply to one project-relative path, ascending by id.
    pub fn rules_for(&self, path: &Path) -> Vec<&RuleDocument> {
        let rel = slash(path);
        self.rules
            .iter()
            .filter(|r| {
                r.always_apply
                    || matches!(r.matcher(), Ok(Some(m)) if m.is_match(&rel))
            })
            .collect()
    }

    pub fn get(&self, id: &RuleId) -> Option<&RuleDocument> {
        self.rules.iter().find(|r| &r.id == id)
    }
}

/// Load a stack's rules plus the project's rule directories and merge them.
///
/// Precedence is load order: stack rules, each configured legacy directory,
/// then hand-written files in `.phase/rules`. Copies written there by
/// `Materializer::write_rules` are skipped, so the registry stays the source
/// of stack rules.
pub fn resolve(
    registry: &Registry,
    stack_name: &str,
    root: &Path,
    project_files: &[PathBuf],
    config: &RulesConfig,
) -> Result<ResolvedRuleSet> {
    let stack = registry.get(stack_name)?;

    let mut layers = vec![stack.rules];
    let project_dirs = config
        .legacy_dirs
        .iter()
        .cloned()
        .chain(std::iter::once(PathBuf::from(paths::RULES_DIR)));
    for rel in project_dirs {
        layers.push(rule::load_dir(&root.join(&rel), RuleSource::Project(rel))?);
    }

    let resolved = merge(stack_name, layers, project_files)?;
    tracing::debug!(
        stack = %stack_name,
        rules = resolved.rules.len(),
        overrides = resolved.overrides.len(),
        "resolved rules"
    );
    Ok(resolved)
}

/// Merge rule layers given in precedence order (lowest first).
pub fn merge(
    stack_name: &str,
    layers: Vec<Vec<RuleDocument>>,
    project_files: &[PathBuf],
) -> Result<ResolvedRuleSet> {
    let files: Vec<String> = project_files.iter().map(|p| slash(p)).collect();
    let mut included: Vec<RuleDocument> = Vec::new();
    let mut overrides = Vec::new();
    let mut skipped = Vec::new();

    for mut layer in layers {
        sort_rules(&mut layer);
        for rule in layer {
            if let Some(reason) = exclusion(&rule, &files)? {
                skipped.push(SkippedRule {
                    id: rule.id.clone(),
                    source: rule.source.clone(),
                    reason,
                });
                continue;
            }
            match included.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) if existing.same_content(&rule) => {}
                Some(existing) => {
                    tracing::info!(
                        id = %rule.id,
                        winner = %rule.source,
                        loser = %existing.source,
                        "rule overridden"
                    );
                    overrides.push(RuleOverride {
                        id: rule.id.clone(),
                        winner: rule.source.clone(),
                        loser: existing.source.clone(),
                    });
                    *existing = rule;
                }
                None => included.push(rule),
            }
        }
    }

    sort_rules(&mut included);
    Ok(ResolvedRuleSet {
        stack: stack_name.to_string(),
        rules: included,
        overrides,
        skipped,
    })
}

/// `None` when the rule is included, otherwise why it is not.
fn exclusion(rule: &RuleDocument, files: &[String]) -> Result<Option<String>> {
    if rule.always_apply {
        return Ok(None);
    }
    let Some(matcher) = rule.matcher()? else {
        return Ok(Some("not always-applied and has no glob".to_string()));
    };
    if files.iter().any(|f| matcher.is_match(f)) {
        Ok(None)
    } else {
        Ok(Some(format!(
            "glob '{}' matches no project file",
            rule.glob.as_deref().unwrap_or_default()
        )))
    }
}

fn slash(path: &Path) -> String {
    paths::relative_slash(Path::new(""), path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
