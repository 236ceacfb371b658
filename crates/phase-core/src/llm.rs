//! The boundary to whatever model generates code. phasekit never talks to a
//! model itself; it assembles the payload and checks that what comes back is
//! structurally usable.

use crate::context::ProjectContext;
use crate::error::{PhaseError, Result};
use crate::resolver::ResolvedRuleSet;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Everything a generator is given for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPayload {
    pub context: ProjectContext,
    pub rules: ResolvedRuleSet,
    pub goal: String,
}

impl ContextPayload {
    pub fn new(context: ProjectContext, rules: ResolvedRuleSet, goal: &str) -> Result<Self> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(PhaseError::InvalidValue("goal must not be empty".to_string()));
        }
        Ok(Self {
            context,
            rules,
            goal: goal.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateFile,
    EditFile,
    DeleteFile,
    RunCommand,
}

impl ActionKind {
    fn targets_file(self) -> bool {
        !matches!(self, ActionKind::RunCommand)
    }

    fn needs_content(self) -> bool {
        matches!(self, ActionKind::CreateFile | ActionKind::EditFile)
    }
}

/// What a generator hands back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Generation {
    Action {
        kind: ActionKind,
        target: String,
        #[serde(default)]
        content: String,
    },
    Text { text: String },
}

impl Generation {
    /// Decode a raw JSON response.
    pub fn parse(raw: &str) -> Result<Self> {
        let generation: Generation = serde_json::from_str(raw)
            .map_err(|e| PhaseError::InvalidGeneration(e.to_string()))?;
        generation.validate()?;
        Ok(generation)
    }

    /// Structural checks only. Whether the content is any good is not our
    /// call.
    pub fn validate(&self) -> Result<()> {
        let bad = |reason: String| Err(PhaseError::InvalidGeneration(reason));
        match self {
            Generation::Text { text } if text.trim().is_empty() => bad("empty text".to_string()),
            Generation::Text { .. } => Ok(()),
            Generation::Action {
                kind,
                target,
                content,
            } => {
                if target.trim().is_empty() {
                    return bad(format!("{kind:?} action has no target"));
                }
                if kind.targets_file() {
                    let path = Path::new(target);
                    if path.is_absolute()
                        || path.components().any(|c| matches!(c, Component::ParentDir))
                    {
                        return bad(format!("target '{target}' escapes the project root"));
                    }
                }
                if kind.needs_content() && content.is_empty() {
                    return bad(format!("{kind:?} action on '{target}' has no content"));
                }
                Ok(())
            }
        }
    }
}

pub trait Generator {
    fn generate(&self, payload: &ContextPayload) -> Result<Generation>;
}

/// Call the generator once and validate the result. A malformed generation
/// is returned as an error, never retried.
pub fn request(generator: &dyn Generator, payload: &ContextPayload) -> Result<Generation> {
    let generation = generator.generate(payload)?;
    if let Err(e) = generation.validate() {
        tracing::warn!(goal = %payload.goal, error = %e, "generator returned a malformed result");
        return Err(e);
    }
    Ok(generation)
}
