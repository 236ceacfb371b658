//! The project context artifact: `.phase/context.md`.
//!
//! One markdown file holds the project's stack snapshot, strictness, active
//! phase, optional phase plan and the last detection report. It is meant to
//! be read by both humans and the LLM, so it uses fixed `##` headings with
//! `- Key: value` lines rather than YAML. Rendering carries no timestamps;
//! writing the same context twice produces the same bytes.

use crate::detect::{DetectionReport, StackScore};
use crate::error::{PhaseError, Result};
use crate::markdown::{Document, Section, Writer};
use crate::stack::{StackContext, StackDefinition, ACTIVE_PHASE};
use crate::types::{label_for, PhaseKind, PhaseRef, PhaseStatus, Strictness};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONTEXT_MARKER: &str = "<!-- phasekit context v1 -->";
const PHASE_PLAN: &str = "Phase Plan";
const DETECTED_SIGNALS: &str = "Detected Signals";

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPhase {
    pub title: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub active_stack: String,
    pub stack: StackContext,
    pub strictness: Strictness,
    pub active_phase: PhaseRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<PlannedPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected: Option<DetectionReport>,
}

impl ProjectContext {
    /// Fresh context for a stack: skeleton phase planned, default strictness.
    pub fn new(def: &StackDefinition) -> Self {
        Self {
            active_stack: def.name.clone(),
            stack: def.context.clone(),
            strictness: Strictness::default(),
            active_phase: PhaseRef::skeleton(),
            plan: Vec::new(),
            detected: None,
        }
    }

    /// Planned phase at `index`, if the project has a plan that long.
    pub fn planned(&self, index: u32) -> Option<&PlannedPhase> {
        self.plan.get(index as usize)
    }

    /// Status of any phase, derived from the active one: everything before it
    /// is complete, everything after it planned.
    pub fn status_of(&self, index: u32) -> PhaseStatus {
        use std::cmp::Ordering;
        match index.cmp(&self.active_phase.index) {
            Ordering::Less => PhaseStatus::Complete,
            Ordering::Equal => self.active_phase.status,
            Ordering::Greater => PhaseStatus::Planned,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let phase = &self.active_phase;
        if phase.kind != PhaseKind::for_index(phase.index) {
            return Err(PhaseError::InvalidContext(format!(
                "phase {} cannot be of kind {}",
                phase.index, phase.kind
            )));
        }
        if !self.plan.is_empty() && phase.index as usize >= self.plan.len() {
            return Err(PhaseError::InvalidContext(format!(
                "active phase {} is outside the {}-phase plan",
                phase.index,
                self.plan.len()
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    pub fn render(&self) -> String {
        let mut w = Writer::new();
        w.raw(CONTEXT_MARKER);
        w.raw("# Project Context");

        self.stack.write_tech_stack(&mut w, Some(&self.active_stack));
        self.stack.write_style(&mut w);
        self.stack.write_key_rules(&mut w);

        let phase = &self.active_phase;
        w.heading(ACTIVE_PHASE)
            .field("Phase", &phase.label())
            .field("Kind", phase.kind.as_str())
            .field("Index", &phase.index.to_string())
            .field("Status", phase.status.as_str());
        if let Some(planned) = self.planned(phase.index) {
            w.field("Title", &planned.title);
        }
        w.opt_field("Marker", self.stack.phase_marker.as_deref());

        w.heading(&format!("Strictness: {}", self.strictness.title()));
        w.raw(self.strictness.guidance());

        if !self.plan.is_empty() {
            w.heading(PHASE_PLAN);
            for (i, planned) in self.plan.iter().enumerate() {
                w.subheading(&format!("{i}. {}", planned.title));
                for d in &planned.deliverables {
                    w.field("Deliverable", d);
                }
            }
        }

        if let Some(report) = &self.detected {
            write_detection(&mut w, report);
        }
        w.finish()
    }

    // -----------------------------------------------------------------------
    // Parsing
    // -----------------------------------------------------------------------

    pub fn parse(content: &str) -> Result<Self> {
        let doc = Document::parse(content);
        let stack = StackContext::from_document(&doc).map_err(PhaseError::InvalidContext)?;
        let active_stack = doc
            .section(crate::stack::TECH_STACK)
            .and_then(|s| s.field("Stack"))
            .ok_or_else(|| PhaseError::InvalidContext("'## Tech Stack' has no '- Stack:' entry".into()))?
            .to_string();

        let (_, level) = doc
            .section_with_value("Strictness")
            .ok_or_else(|| PhaseError::InvalidContext("missing '## Strictness: <level>' section".into()))?;
        let strictness: Strictness = level.parse()?;

        let active = doc
            .section(ACTIVE_PHASE)
            .ok_or_else(|| PhaseError::InvalidContext(format!("missing '## {ACTIVE_PHASE}' section")))?;
        let active_phase = parse_active_phase(active)?;

        let plan = match doc.section(PHASE_PLAN) {
            Some(section) => parse_plan(section)?,
            None => Vec::new(),
        };
        let detected = doc.section(DETECTED_SIGNALS).map(parse_detection).transpose()?;

        let ctx = Self {
            active_stack,
            stack,
            strictness,
            active_phase,
            plan,
            detected,
        };
        ctx.validate()?;
        Ok(ctx)
    }
}

fn required<'a>(section: &'a Section, key: &str) -> Result<&'a str> {
    section.field(key).ok_or_else(|| {
        PhaseError::InvalidContext(format!("'## {}' has no '- {key}:' entry", section.heading))
    })
}

fn parse_active_phase(section: &Section) -> Result<PhaseRef> {
    let index: u32 = required(section, "Index")?
        .parse()
        .map_err(|_| PhaseError::InvalidContext("phase index is not a number".into()))?;
    let kind: PhaseKind = required(section, "Kind")?.parse()?;
    let status: PhaseStatus = required(section, "Status")?.parse()?;
    if let Some(label) = section.field("Phase") {
        if label != label_for(index) {
            return Err(PhaseError::InvalidContext(format!(
                "phase label '{label}' does not match index {index}"
            )));
        }
    }
    Ok(PhaseRef {
        kind,
        index,
        status,
    })
}

fn parse_plan(section: &Section) -> Result<Vec<PlannedPhase>> {
    let mut plan = Vec::new();
    for (i, sub) in section.subsections.iter().enumerate() {
        let (num, title) = sub.heading.split_once(". ").ok_or_else(|| {
            PhaseError::InvalidContext(format!("plan heading '{}' must look like 'N. Title'", sub.heading))
        })?;
        if num.trim().parse::<usize>().ok() != Some(i) {
            return Err(PhaseError::InvalidContext(format!(
                "plan heading '{}' is out of sequence (expected {i})",
                sub.heading
            )));
        }
        plan.push(PlannedPhase {
            title: title.trim().to_string(),
            deliverables: sub.field_all("Deliverable").map(str::to_string).collect(),
        });
    }
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Detected Signals section
// ---------------------------------------------------------------------------

fn write_detection(w: &mut Writer, report: &DetectionReport) {
    w.heading(DETECTED_SIGNALS);
    w.opt_field("Matched", report.matched_stack.as_deref());
    w.field("Confidence", &report.confidence.to_string());
    w.opt_field("Language", report.observed_language.as_deref());
    w.opt_field("Framework", report.observed_framework.as_deref());
    if let Some(naming) = report.observed_naming {
        w.field("Naming", naming.as_str());
    }
    if let Some(indent) = report.observed_indentation {
        w.field("Indentation", &indent.to_string());
    }
    w.field("Architecture", &report.observed_architecture);
    for path in &report.sampled_files {
        w.field("Sampled", &crate::paths::relative_slash(std::path::Path::new(""), path));
    }
    for m in &report.manifests {
        w.field("Manifest", m);
    }
    for t in &report.tooling {
        w.field("Tooling", t);
    }
    for c in &report.candidates {
        w.field("Candidate", &format!("{} ({}/{})", c.stack, c.agreeing, c.evidenced));
    }
    for t in &report.ties {
        w.field("Tie", t);
    }
}

fn parse_candidate(value: &str) -> Result<StackScore> {
    let bad = || PhaseError::InvalidContext(format!("candidate '{value}' must look like 'name (a/e)'"));
    let (stack, rest) = value.split_once(" (").ok_or_else(bad)?;
    let (agreeing, evidenced) = rest
        .strip_suffix(')')
        .and_then(|r| r.split_once('/'))
        .ok_or_else(bad)?;
    Ok(StackScore {
        stack: stack.to_string(),
        agreeing: agreeing.parse().map_err(|_| bad())?,
        evidenced: evidenced.parse().map_err(|_| bad())?,
    })
}

fn parse_detection(section: &Section) -> Result<DetectionReport> {
    let confidence: f64 = required(section, "Confidence")?
        .parse()
        .map_err(|_| PhaseError::InvalidContext("detection confidence is not a number".into()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(PhaseError::InvalidContext(format!(
            "detection confidence {confidence} is outside [0, 1]"
        )));
    }
    let strings = |key: &str| section.field_all(key).map(str::to_string).collect::<Vec<_>>();
    Ok(DetectionReport {
        matched_stack: section.field("Matched").map(str::to_string),
        confidence,
        observed_language: section.field("Language").map(str::to_string),
        observed_framework: section.field("Framework").map(str::to_string),
        observed_naming: section.field("Naming").map(str::parse).transpose()?,
        observed_indentation: section.field("Indentation").map(str::parse).transpose()?,
        observed_architecture: section.field("Architecture").unwrap_or_default().to_string(),
        sampled_files: section.field_all("Sampled").map(PathBuf::from).collect(),
        manifests: strings("Manifest"),
        tooling: strings("Tooling"),
        candidates: section
            .field_all("Candidate")
            .map(parse_candidate)
            .collect::<Result<_>>()?,
        ties: strings("Tie"),
    })
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Field-wise update applied under the context lock. `None` leaves a field
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct ContextPatch {
    pub stack: Option<(String, StackContext)>,
    pub strictness: Option<Strictness>,
    pub active_phase: Option<PhaseRef>,
    pub plan: Option<Vec<PlannedPhase>>,
    /// `Some(None)` clears the detection report.
    pub detected: Option<Option<DetectionReport>>,
}

impl ContextPatch {
    pub fn strictness(level: Strictness) -> Self {
        Self {
            strictness: Some(level),
            ..Self::default()
        }
    }

    pub fn active_phase(phase: PhaseRef) -> Self {
        Self {
            active_phase: Some(phase),
            ..Self::default()
        }
    }

    pub fn apply(self, ctx: &mut ProjectContext) {
        if let Some((name, stack)) = self.stack {
            ctx.active_stack = name;
            ctx.stack = stack;
        }
        if let Some(level) = self.strictness {
            ctx.strictness = level;
        }
        if let Some(phase) = self.active_phase {
            ctx.active_phase = phase;
        }
        if let Some(plan) = self.plan {
            ctx.plan = plan;
        }
        if let Some(detected) = self.detected {
            ctx.detected = detected;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
