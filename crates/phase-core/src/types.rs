use crate::error::PhaseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// PhaseKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Skeleton,
    Implementation,
}

impl PhaseKind {
    /// Index 0 is always the skeleton; everything after it is implementation.
    pub fn for_index(index: u32) -> Self {
        if index == 0 {
            PhaseKind::Skeleton
        } else {
            PhaseKind::Implementation
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Skeleton => "skeleton",
            PhaseKind::Implementation => "implementation",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseKind {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skeleton" => Ok(PhaseKind::Skeleton),
            "implementation" => Ok(PhaseKind::Implementation),
            _ => Err(PhaseError::InvalidValue(format!("unknown phase kind '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Planned,
    InProgress,
    Complete,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Planned => "planned",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Complete => "complete",
        }
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(PhaseStatus::Planned),
            "in_progress" | "in-progress" => Ok(PhaseStatus::InProgress),
            "complete" => Ok(PhaseStatus::Complete),
            _ => Err(PhaseError::InvalidValue(format!("unknown phase status '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// PhaseRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhaseRef {
    pub kind: PhaseKind,
    pub index: u32,
    pub status: PhaseStatus,
}

impl PhaseRef {
    pub fn skeleton() -> Self {
        Self::planned(0)
    }

    pub fn planned(index: u32) -> Self {
        Self {
            kind: PhaseKind::for_index(index),
            index,
            status: PhaseStatus::Planned,
        }
    }

    pub fn with_status(self, status: PhaseStatus) -> Self {
        Self { status, ..self }
    }

    /// Stable label used in file names and messages: `skeleton`, `implementation-3`.
    pub fn label(&self) -> String {
        label_for(self.index)
    }
}

pub fn label_for(index: u32) -> String {
    match PhaseKind::for_index(index) {
        PhaseKind::Skeleton => "skeleton".to_string(),
        PhaseKind::Implementation => format!("implementation-{index}"),
    }
}

impl fmt::Display for PhaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.status)
    }
}

// ---------------------------------------------------------------------------
// Strictness
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    High,
    #[default]
    Medium,
    Low,
}

impl Strictness {
    /// Heading form used in the context artifact (`## Strictness: High`).
    pub fn title(self) -> &'static str {
        match self {
            Strictness::High => "High",
            Strictness::Medium => "Medium",
            Strictness::Low => "Low",
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            Strictness::High => "Apply every rule to new and existing code; refactor legacy code you touch.",
            Strictness::Medium => "Apply every rule to new code; leave untouched legacy code as is.",
            Strictness::Low => "Follow existing project conventions first; rules are advisory.",
        }
    }
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Strictness {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Strictness::High),
            "medium" => Ok(Strictness::Medium),
            "low" => Ok(Strictness::Low),
            _ => Err(PhaseError::InvalidValue(format!(
                "unknown strictness '{s}' (expected high, medium or low)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// TestsStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestsStatus {
    #[default]
    NotRun,
    Failing,
    Passing,
}

impl fmt::Display for TestsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestsStatus::NotRun => "not_run",
            TestsStatus::Failing => "failing",
            TestsStatus::Passing => "passing",
        };
        f.write_str(s)
    }
}

impl FromStr for TestsStatus {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_run" | "not-run" => Ok(TestsStatus::NotRun),
            "failing" => Ok(TestsStatus::Failing),
            "passing" => Ok(TestsStatus::Passing),
            _ => Err(PhaseError::InvalidValue(format!(
                "unknown tests status '{s}' (expected passing, failing or not_run)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// NamingConvention
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingConvention {
    Snake,
    Camel,
    Pascal,
    Kebab,
}

impl NamingConvention {
    pub fn as_str(self) -> &'static str {
        match self {
            NamingConvention::Snake => "snake",
            NamingConvention::Camel => "camel",
            NamingConvention::Pascal => "pascal",
            NamingConvention::Kebab => "kebab",
        }
    }

    /// Classify a single identifier. Single-word lowercase names carry no signal.
    pub fn classify(ident: &str) -> Option<Self> {
        let first = ident.chars().next()?;
        if ident.contains('-') {
            return Some(NamingConvention::Kebab);
        }
        if ident.trim_matches('_').contains('_') {
            if ident.chars().any(|c| c.is_ascii_uppercase()) {
                // SCREAMING_SNAKE constants say nothing about function naming.
                return None;
            }
            return Some(NamingConvention::Snake);
        }
        if first.is_ascii_uppercase() {
            if ident.chars().skip(1).any(|c| c.is_ascii_lowercase()) {
                return Some(NamingConvention::Pascal);
            }
            return None;
        }
        if first.is_ascii_lowercase() && ident.chars().any(|c| c.is_ascii_uppercase()) {
            return Some(NamingConvention::Camel);
        }
        None
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamingConvention {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snake" | "snake_case" => Ok(NamingConvention::Snake),
            "camel" | "camelcase" => Ok(NamingConvention::Camel),
            "pascal" | "pascalcase" => Ok(NamingConvention::Pascal),
            "kebab" | "kebab-case" => Ok(NamingConvention::Kebab),
            _ => Err(PhaseError::InvalidValue(format!("unknown naming convention '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Indentation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "style", content = "width", rename_all = "snake_case")]
pub enum Indentation {
    Tabs,
    Spaces(u8),
}

impl fmt::Display for Indentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indentation::Tabs => f.write_str("tabs"),
            Indentation::Spaces(n) => write!(f, "{n} spaces"),
        }
    }
}

impl FromStr for Indentation {
    type Err = PhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "tabs" {
            return Ok(Indentation::Tabs);
        }
        s.strip_suffix(" spaces")
            .and_then(|n| n.parse::<u8>().ok())
            .map(Indentation::Spaces)
            .ok_or_else(|| PhaseError::InvalidValue(format!("unknown indentation '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
