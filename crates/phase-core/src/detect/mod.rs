//! Heuristic stack detection for existing projects.
//!
//! Three independent evidence categories are collected: manifests and the
//! dependencies they declare, a small sample of source files, and test/lint
//! tooling configs. Each registry stack is then scored by how many of the
//! categories that produced evidence agree with its `signals`. Categories
//! with no evidence are left out of the denominator, so a bare repository
//! scores zero against everything rather than matching by default.

macro_rules! lazy_re {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static ::regex::Regex {
            static RE: ::std::sync::OnceLock<::regex::Regex> = ::std::sync::OnceLock::new();
            RE.get_or_init(|| ::regex::Regex::new($pattern).unwrap())
        }
    };
}

pub mod manifest;
pub mod sample;
pub mod scan;
pub mod tooling;

use crate::config::DetectionConfig;
use crate::error::Result;
use crate::io;
use crate::stack::StackDefinition;
use crate::types::{Indentation, NamingConvention};
use globset::{Glob, GlobSetBuilder};
use manifest::ManifestEvidence;
use sample::SourceSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// One stack's score: categories that agreed over categories with evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackScore {
    pub stack: String,
    pub agreeing: u8,
    pub evidenced: u8,
}

impl StackScore {
    pub fn confidence(&self) -> f64 {
        if self.evidenced == 0 {
            0.0
        } else {
            f64::from(self.agreeing) / f64::from(self.evidenced)
        }
    }

    /// Exact comparison of the two fractions, no float rounding.
    fn same_confidence(&self, other: &StackScore) -> bool {
        u16::from(self.agreeing) * u16::from(other.evidenced)
            == u16::from(other.agreeing) * u16::from(self.evidenced)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub matched_stack: Option<String>,
    /// Confidence of the best-scoring stack, matched or not.
    pub confidence: f64,
    pub observed_language: Option<String>,
    pub observed_framework: Option<String>,
    pub observed_naming: Option<NamingConvention>,
    pub observed_indentation: Option<Indentation>,
    pub observed_architecture: String,
    pub sampled_files: Vec<PathBuf>,
    #[serde(default)]
    pub manifests: Vec<String>,
    #[serde(default)]
    pub tooling: Vec<String>,
    /// Every scored stack, best first, name order within equal scores.
    #[serde(default)]
    pub candidates: Vec<StackScore>,
    /// Stacks sharing the best qualifying score when more than one does.
    #[serde(default)]
    pub ties: Vec<String>,
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Everything observed in the project, independent of any stack.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub manifests: ManifestEvidence,
    pub samples: Vec<SourceSample>,
    pub tooling: Vec<String>,
    pub files: Vec<PathBuf>,
}

impl Evidence {
    pub fn collect(root: &Path, config: &DetectionConfig) -> Result<Self> {
        let files = scan::project_files(root, config.max_walk_entries)?;
        let manifests = manifest::scan(root, &files, config.max_sample_bytes)?;
        let mut samples = Vec::new();
        for rel in sample::choose(&files, config.max_sampled_files) {
            let content = io::read_prefix(&root.join(&rel), config.max_sample_bytes)?;
            samples.push(sample::analyze(&rel, &content));
        }
        let tooling = tooling::scan(&files)?;
        tracing::debug!(
            files = files.len(),
            manifests = manifests.found.len(),
            samples = samples.len(),
            tooling = tooling.len(),
            "collected detection evidence"
        );
        Ok(Self {
            manifests,
            samples,
            tooling,
            files,
        })
    }

    fn imports(&self) -> impl Iterator<Item = &str> {
        self.samples
            .iter()
            .flat_map(|s| s.imports.iter().map(String::as_str))
    }

    /// Manifest ecosystem, refined by the source census; the dominant source
    /// language when there is no manifest.
    fn language(&self) -> Option<String> {
        let census = sample::language_census(&self.files);
        match self.manifests.ecosystem.as_deref() {
            Some("javascript") => {
                let ts = census.get("typescript").copied().unwrap_or(0);
                let js = census.get("javascript").copied().unwrap_or(0);
                Some(if ts > js { "typescript" } else { "javascript" }.to_string())
            }
            Some(eco) => Some(eco.to_string()),
            None => census
                .into_iter()
                .max_by(|(la, ca), (lb, cb)| ca.cmp(cb).then(lb.cmp(la)))
                .map(|(lang, _)| lang.to_string()),
        }
    }
}

/// `dep` names the framework itself or one of its sub-packages
/// (`spring-boot-starter-web` for `spring-boot`, `fastapi.routing` for `fastapi`).
pub fn names_framework(dep: &str, framework: &str) -> bool {
    dep == framework
        || dep
            .strip_prefix(framework)
            .is_some_and(|rest| rest.starts_with(['-', '/', '.']))
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn any_name_matches(patterns: &[String], names: &[String]) -> Result<bool> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p)?);
    }
    let set = builder.build()?;
    Ok(names.iter().any(|n| set.is_match(n)))
}

fn score(def: &StackDefinition, ev: &Evidence, known_frameworks: &BTreeSet<&str>) -> Result<StackScore> {
    let signals = &def.signals;
    let mut agreeing = 0u8;
    let mut evidenced = 0u8;

    if !ev.manifests.found.is_empty() {
        evidenced += 1;
        let manifest_ok = any_name_matches(&signals.manifests, &ev.manifests.found)?;
        let framework_ok = signals.frameworks.is_empty()
            || ev
                .manifests
                .dependencies
                .iter()
                .any(|d| signals.frameworks.iter().any(|f| names_framework(d, f)));
        if manifest_ok && framework_ok {
            agreeing += 1;
        }
    }

    if !ev.samples.is_empty() {
        evidenced += 1;
        let imports_known = ev
            .imports()
            .any(|i| known_frameworks.iter().any(|f| names_framework(i, f)));
        let agrees = if imports_known {
            ev.imports()
                .any(|i| signals.frameworks.iter().any(|f| names_framework(i, f)))
        } else {
            ev.samples
                .iter()
                .filter_map(|s| s.language)
                .any(|lang| signals.languages.iter().any(|l| l == lang))
        };
        if agrees {
            agreeing += 1;
        }
    }

    if !ev.tooling.is_empty() {
        evidenced += 1;
        if any_name_matches(&signals.tooling, &ev.tooling)? {
            agreeing += 1;
        }
    }

    Ok(StackScore {
        stack: def.name.clone(),
        agreeing,
        evidenced,
    })
}

/// Score every stack against already-collected evidence.
pub fn evaluate(ev: &Evidence, stacks: &[StackDefinition], min_confidence: f64) -> Result<DetectionReport> {
    let known_frameworks: BTreeSet<&str> = stacks
        .iter()
        .flat_map(|s| s.signals.frameworks.iter().map(String::as_str))
        .collect();

    let mut candidates = stacks
        .iter()
        .map(|def| score(def, ev, &known_frameworks))
        .collect::<Result<Vec<_>>>()?;
    candidates.sort_by(|a, b| {
        b.confidence()
            .total_cmp(&a.confidence())
            .then_with(|| a.stack.cmp(&b.stack))
    });

    let best = candidates.first();
    let confidence = best.map(StackScore::confidence).unwrap_or(0.0);
    let qualifying: Vec<&StackScore> = match best {
        Some(b) if b.agreeing > 0 && b.confidence() >= min_confidence => candidates
            .iter()
            .take_while(|c| c.same_confidence(b))
            .collect(),
        _ => Vec::new(),
    };
    let (matched_stack, ties) = match qualifying.as_slice() {
        [] => (None, Vec::new()),
        [only] => (Some(only.stack.clone()), Vec::new()),
        many => (None, many.iter().map(|c| c.stack.clone()).collect()),
    };

    let observed_framework = ev
        .manifests
        .dependencies
        .iter()
        .map(String::as_str)
        .chain(ev.imports())
        .find_map(|dep| {
            known_frameworks
                .iter()
                .find(|f| names_framework(dep, f))
                .map(|f| f.to_string())
        });

    Ok(DetectionReport {
        matched_stack,
        confidence,
        observed_language: ev.language(),
        observed_framework,
        observed_naming: sample::dominant_naming(&ev.samples),
        observed_indentation: sample::dominant_indentation(&ev.samples),
        observed_architecture: sample::architecture(&ev.files),
        sampled_files: ev.samples.iter().map(|s| s.path.clone()).collect(),
        manifests: ev.manifests.found.clone(),
        tooling: ev.tooling.clone(),
        candidates,
        ties,
    })
}

/// Collect evidence under `root` and score it against `stacks`.
pub fn detect(root: &Path, stacks: &[StackDefinition], config: &DetectionConfig) -> Result<DetectionReport> {
    let ev = Evidence::collect(root, config)?;
    let report = evaluate(&ev, stacks, config.min_confidence)?;
    tracing::info!(
        matched = report.matched_stack.as_deref().unwrap_or("-"),
        confidence = report.confidence,
        ties = report.ties.len(),
        "detection finished"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{StackContext, StackSignals};
    use tempfile::TempDir;

    fn stack(name: &str, signals: StackSignals) -> StackDefinition {
        let mut def = StackDefinition::new(
            name,
            StackContext {
                language: "x".to_string(),
                ..StackContext::default()
            },
        );
        def.signals = signals;
        def
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn registry_stacks() -> Vec<StackDefinition> {
        vec![
            stack(
                "python-fastapi",
                StackSignals {
                    languages: strings(&["python"]),
                    manifests: strings(&["requirements.txt", "pyproject.toml"]),
                    frameworks: strings(&["fastapi"]),
                    tooling: strings(&["pytest.ini", "conftest.py", "ruff.toml"]),
                },
            ),
            stack(
                "node-express",
                StackSignals {
                    languages: strings(&["javascript", "typescript"]),
                    manifests: strings(&["package.json"]),
                    frameworks: strings(&["express"]),
                    tooling: strings(&["jest.config.*", ".eslintrc*"]),
                },
            ),
        ]
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, content).unwrap();
    }

    #[test]
    fn empty_directory_matches_nothing() {
        let dir = TempDir::new().unwrap();
        let report = detect(dir.path(), &registry_stacks(), &DetectionConfig::default()).unwrap();
        assert_eq!(report.matched_stack, None);
        assert_eq!(report.confidence, 0.0);
        assert!(report.candidates.iter().all(|c| c.evidenced == 0));
        assert!(report.sampled_files.is_empty());
    }

    #[test]
    fn express_with_typescript_tests() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies":{"express":"^4.19.0"}}"#,
        );
        write(
            dir.path(),
            "tests/app.spec.ts",
            "import request from 'supertest';\n\nconst userList = [];\n",
        );
        let report = detect(dir.path(), &registry_stacks(), &DetectionConfig::default()).unwrap();
        assert_eq!(report.matched_stack.as_deref(), Some("node-express"));
        assert_eq!(report.confidence, 1.0);
        assert_eq!(report.observed_language.as_deref(), Some("typescript"));
        assert_eq!(report.observed_framework.as_deref(), Some("express"));
        assert_eq!(report.sampled_files, vec![PathBuf::from("tests/app.spec.ts")]);

        let python = report
            .candidates
            .iter()
            .find(|c| c.stack == "python-fastapi")
            .unwrap();
        assert_eq!(python.agreeing, 0);
        assert_eq!(python.confidence(), 0.0);
    }

    #[test]
    fn fastapi_project_with_tooling() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "requirements.txt", "fastapi>=0.110\nuvicorn\n");
        write(
            dir.path(),
            "app/main.py",
            "from fastapi import FastAPI\n\napp = FastAPI()\n\ndef read_root():\n    return {}\n",
        );
        write(dir.path(), "pytest.ini", "[pytest]\n");
        let report = detect(dir.path(), &registry_stacks(), &DetectionConfig::default()).unwrap();
        assert_eq!(report.matched_stack.as_deref(), Some("python-fastapi"));
        assert_eq!(report.candidates[0].evidenced, 3);
        assert_eq!(report.observed_naming, Some(NamingConvention::Snake));
        assert_eq!(report.observed_indentation, Some(Indentation::Spaces(4)));
        assert_eq!(report.tooling, vec!["pytest.ini"]);
    }

    #[test]
    fn foreign_framework_import_disagrees() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "src/index.js",
            "const express = require('express');\n",
        );
        let report = detect(dir.path(), &registry_stacks(), &DetectionConfig::default()).unwrap();
        // Only the source category has evidence.
        assert_eq!(report.matched_stack.as_deref(), Some("node-express"));
        let python = report
            .candidates
            .iter()
            .find(|c| c.stack == "python-fastapi")
            .unwrap();
        assert_eq!((python.agreeing, python.evidenced), (0, 1));
    }

    #[test]
    fn equal_best_scores_are_reported_as_ties() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "package.json", "{}");
        let mut stacks = registry_stacks();
        stacks.push(stack(
            "node-koa",
            StackSignals {
                manifests: strings(&["package.json"]),
                ..StackSignals::default()
            },
        ));
        stacks.push(stack(
            "node-plain",
            StackSignals {
                manifests: strings(&["package.json"]),
                ..StackSignals::default()
            },
        ));
        let report = detect(dir.path(), &stacks, &DetectionConfig::default()).unwrap();
        assert_eq!(report.matched_stack, None);
        assert_eq!(report.ties, vec!["node-koa", "node-plain"]);
        assert_eq!(report.confidence, 1.0);
    }

    #[test]
    fn below_threshold_is_unmatched() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "requirements.txt", "flask\n");
        write(dir.path(), "app/main.py", "import flask\n");
        write(dir.path(), ".eslintrc.json", "{}");
        let config = DetectionConfig {
            min_confidence: 0.9,
            ..DetectionConfig::default()
        };
        let report = detect(dir.path(), &registry_stacks(), &config).unwrap();
        assert_eq!(report.matched_stack, None);
        assert!(report.ties.is_empty());
    }

    #[test]
    fn framework_name_matching() {
        assert!(names_framework("spring-boot-starter-web", "spring-boot"));
        assert!(names_framework("fastapi.routing", "fastapi"));
        assert!(names_framework("github.com/gin-gonic/gin", "github.com/gin-gonic/gin"));
        assert!(!names_framework("expressive", "express"));
    }
}
