use crate::context::PlannedPhase;
use crate::error::{PhaseError, Result};
use crate::types::Strictness;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A phase plan file handed to `setup --from-plan`.
///
/// ```yaml
/// stack: python-fastapi
/// strictness: medium
/// phases:
///   - title: Skeleton
///     deliverables: ["app/main.py"]
///   - title: Users module
///     deliverables: ["app/modules/users/**"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strictness: Option<Strictness>,
    pub phases: Vec<PlannedPhase>,
}

impl PhasePlan {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let plan: PhasePlan =
            serde_yaml::from_str(data).map_err(|e| PhaseError::InvalidPlan(e.to_string()))?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(PhaseError::InvalidPlan(
                "a plan needs at least the skeleton phase".to_string(),
            ));
        }
        for (i, phase) in self.phases.iter().enumerate() {
            if phase.title.trim().is_empty() {
                return Err(PhaseError::InvalidPlan(format!("phase {i} has no title")));
            }
            for d in &phase.deliverables {
                Glob::new(d).map_err(|e| {
                    PhaseError::InvalidPlan(format!("phase {i} deliverable '{d}': {e}"))
                })?;
            }
        }
        Ok(())
    }
}
