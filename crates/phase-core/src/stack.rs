use crate::detect::DetectionReport;
use crate::error::{PhaseError, Result};
use crate::markdown::{Document, Writer};
use crate::paths;
use crate::rule::{RuleDocument, RuleId, RuleSource};
use crate::types::NamingConvention;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// StackContext
// ---------------------------------------------------------------------------

/// The structured part of a stack's `context.md`, also snapshotted into each
/// project's context artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackContext {
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naming: Option<NamingConvention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default)]
    pub key_rules: Vec<String>,
    /// Free-text marker the stack uses for its starting phase, e.g.
    /// `Phase 0 - Skeleton`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_marker: Option<String>,
}

pub const TECH_STACK: &str = "Tech Stack";
pub const VIBE_AND_STYLE: &str = "Vibe & Style";
pub const KEY_RULES: &str = "Key Rules";
pub const ACTIVE_PHASE: &str = "Active Phase";

impl StackContext {
    /// Read the shared headings out of a parsed document. Returns the reason
    /// on failure so callers can wrap it in their own error variant.
    pub fn from_document(doc: &Document) -> std::result::Result<Self, String> {
        let tech = doc
            .section(TECH_STACK)
            .ok_or_else(|| format!("missing '## {TECH_STACK}' section"))?;
        let language = tech
            .field("Language")
            .ok_or_else(|| format!("'## {TECH_STACK}' has no '- Language:' entry"))?
            .to_string();

        let style = doc.section(VIBE_AND_STYLE);
        let naming = style
            .and_then(|s| s.field("Naming"))
            .map(|v| v.parse::<NamingConvention>())
            .transpose()
            .map_err(|e| e.to_string())?;

        let key_rules = doc
            .section(KEY_RULES)
            .map(|s| s.items().map(str::to_string).collect())
            .unwrap_or_default();

        let phase_marker = doc
            .section(ACTIVE_PHASE)
            .and_then(|s| s.field("Marker"))
            .map(str::to_string);

        Ok(Self {
            language,
            framework: tech.field("Framework").map(str::to_string),
            database: tech.field("Database").map(str::to_string),
            testing: tech.field("Testing").map(str::to_string),
            style: style.and_then(|s| s.field("Style")).map(str::to_string),
            naming,
            architecture: style.and_then(|s| s.field("Architecture")).map(str::to_string),
            key_rules,
            phase_marker,
        })
    }

    /// `## Tech Stack`, optionally led by the registry name of the stack.
    pub fn write_tech_stack(&self, w: &mut Writer, stack_name: Option<&str>) {
        w.heading(TECH_STACK);
        w.opt_field("Stack", stack_name);
        w.field("Language", &self.language);
        w.opt_field("Framework", self.framework.as_deref());
        w.opt_field("Database", self.database.as_deref());
        w.opt_field("Testing", self.testing.as_deref());
    }

    pub fn write_style(&self, w: &mut Writer) {
        w.heading(VIBE_AND_STYLE);
        w.opt_field("Style", self.style.as_deref());
        w.opt_field("Naming", self.naming.map(NamingConvention::as_str));
        w.opt_field("Architecture", self.architecture.as_deref());
    }

    pub fn write_key_rules(&self, w: &mut Writer) {
        w.heading(KEY_RULES);
        for rule in &self.key_rules {
            w.item(rule);
        }
    }
}

// ---------------------------------------------------------------------------
// StackSignals
// ---------------------------------------------------------------------------

/// What the detector looks for when scoring a project against this stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackSignals {
    /// Source languages (`python`, `typescript`, ...).
    #[serde(default)]
    pub languages: Vec<String>,
    /// Manifest file name globs (`package.json`, `*.tf`).
    #[serde(default)]
    pub manifests: Vec<String>,
    /// Dependency / import names that identify the framework.
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Test-runner and lint/format config file name globs.
    #[serde(default)]
    pub tooling: Vec<String>,
}

impl StackSignals {
    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.manifests.is_empty()
            && self.frameworks.is_empty()
            && self.tooling.is_empty()
    }
}

/// On-disk `stack.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackManifest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub signals: StackSignals,
}

// ---------------------------------------------------------------------------
// Bundle contents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBlob {
    /// Path relative to the bundle's `templates/` or `examples/` directory.
    pub path: PathBuf,
    #[serde(skip)]
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDocument {
    pub name: String,
    #[serde(skip)]
    pub body: String,
}

// ---------------------------------------------------------------------------
// StackDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub context: StackContext,
    #[serde(default)]
    pub signals: StackSignals,
    pub rules: Vec<RuleDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<FileBlob>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<FileBlob>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guides: Vec<TextDocument>,
}

impl StackDefinition {
    pub fn new(name: impl Into<String>, context: StackContext) -> Self {
        Self {
            name: name.into(),
            description: None,
            context,
            signals: StackSignals::default(),
            rules: Vec::new(),
            templates: Vec::new(),
            examples: Vec::new(),
            guides: Vec::new(),
        }
    }

    pub fn manifest(&self) -> StackManifest {
        StackManifest {
            name: self.name.clone(),
            description: self.description.clone(),
            signals: self.signals.clone(),
        }
    }

    /// Check the bundle invariants: slug name, ascending unique rule ids,
    /// rules owned by this stack, non-empty language.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| PhaseError::InvalidStack {
            stack: self.name.clone(),
            reason,
        };
        paths::validate_slug(&self.name)?;
        if self.context.language.trim().is_empty() {
            return Err(invalid("context has an empty language".to_string()));
        }
        for pair in self.rules.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(invalid(format!("rule id '{}' appears twice", pair[0].id)));
            }
            if pair[0].id > pair[1].id {
                return Err(invalid(format!(
                    "rules out of order: '{}' before '{}'",
                    pair[0].id, pair[1].id
                )));
            }
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.source != RuleSource::Stack(self.name.clone()))
        {
            return Err(invalid(format!(
                "rule '{}' belongs to {}, not this stack",
                rule.id, rule.source
            )));
        }
        for blob in self.templates.iter().chain(&self.examples) {
            if blob.path.is_absolute()
                || blob
                    .path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(invalid(format!(
                    "bundle file '{}' escapes the stack directory",
                    blob.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Parse a stack `context.md`.
    pub fn parse_context(name: &str, content: &str) -> Result<StackContext> {
        StackContext::from_document(&Document::parse(content)).map_err(|reason| {
            PhaseError::InvalidStack {
                stack: name.to_string(),
                reason: format!("context.md: {reason}"),
            }
        })
    }

    /// Render the stack's `context.md`.
    pub fn render_context(&self) -> String {
        let mut w = Writer::new();
        w.raw(&format!("# {} Context", self.name));
        self.context.write_tech_stack(&mut w, None);
        self.context.write_style(&mut w);
        self.context.write_key_rules(&mut w);
        if let Some(marker) = &self.context.phase_marker {
            w.heading(ACTIVE_PHASE);
            w.field("Marker", marker);
        }
        w.finish()
    }

    /// Propose a registry entry from what the detector observed in a project.
    pub fn from_detection(name: &str, report: &DetectionReport) -> Result<Self> {
        paths::validate_slug(name)?;
        let language = report
            .observed_language
            .clone()
            .ok_or_else(|| PhaseError::InvalidStack {
                stack: name.to_string(),
                reason: "detection found no source language to build a stack from".to_string(),
            })?;

        let mut key_rules = Vec::new();
        if let Some(naming) = report.observed_naming {
            key_rules.push(format!("Use {naming} case for functions and variables"));
        }
        if let Some(indent) = report.observed_indentation {
            key_rules.push(format!("Indent with {indent}"));
        }
        key_rules.push(format!(
            "Keep the existing {} structure",
            report.observed_architecture
        ));

        let context = StackContext {
            language: language.clone(),
            framework: report.observed_framework.clone(),
            style: report
                .observed_indentation
                .map(|i| format!("Indent with {i}")),
            naming: report.observed_naming,
            architecture: Some(report.observed_architecture.clone()),
            key_rules: key_rules.clone(),
            ..StackContext::default()
        };

        let mut body = String::from("# Observed Conventions\n\n");
        for rule in &key_rules {
            body.push_str("- ");
            body.push_str(rule);
            body.push('\n');
        }
        let conventions = RuleDocument::new(
            RuleId {
                number: 100,
                slug: "conventions".to_string(),
            },
            body,
            RuleSource::Stack(name.to_string()),
        )
        .with_description("Conventions observed in the existing codebase");

        let mut def = Self::new(name, context);
        def.description = Some(format!("Detected from an existing {language} project"));
        def.signals = StackSignals {
            languages: vec![language],
            manifests: report.manifests.clone(),
            frameworks: report.observed_framework.iter().cloned().collect(),
            tooling: report.tooling.clone(),
        };
        def.rules = vec![conventions];
        def.validate()?;
        Ok(def)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
