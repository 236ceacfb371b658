use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("not initialized: run 'phase setup <stack>' first")]
    NotInitialized,

    #[error("stack not found: {name}{}", closest_hint(.closest))]
    StackNotFound {
        name: String,
        closest: Option<String>,
    },

    #[error("stack already exists: {0} (pass --force to overwrite)")]
    StackExists(String),

    #[error("phase not found: {0}")]
    PhaseNotFound(u32),

    #[error("no open session: run 'phase start-session' first")]
    NoOpenSession,

    #[error("invalid stack '{stack}': {reason}")]
    InvalidStack { stack: String, reason: String },

    #[error("invalid rule {path}: {reason}")]
    InvalidRule { path: PathBuf, reason: String },

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid context artifact: {0}")]
    InvalidContext(String),

    #[error("invalid phase plan: {0}")]
    InvalidPlan(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("malformed generation: {0}")]
    InvalidGeneration(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("a session is already open for {0}; complete it before starting another")]
    SessionAlreadyOpen(String),

    #[error("cannot complete {phase}: unmet deliverables: {}", .unmet.join("; "))]
    IncompletePhase { phase: String, unmet: Vec<String> },

    #[error("context is locked by another invocation ({}), gave up after {waited_ms}ms", .path.display())]
    ContextLocked { path: PathBuf, waited_ms: u64 },

    #[error("home directory not found: set HOME or pass --registry")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Glob(#[from] globset::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

fn closest_hint(closest: &Option<String>) -> String {
    match closest {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

/// Coarse classification used by callers to pick a recovery path or exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    StateConflict,
    NotInitialized,
    Internal,
}

impl PhaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PhaseError::StackNotFound { .. }
            | PhaseError::PhaseNotFound(_)
            | PhaseError::NoOpenSession => ErrorKind::NotFound,
            PhaseError::InvalidStack { .. }
            | PhaseError::InvalidRule { .. }
            | PhaseError::InvalidSlug(_)
            | PhaseError::InvalidValue(_)
            | PhaseError::InvalidContext(_)
            | PhaseError::InvalidPlan(_)
            | PhaseError::InvalidConfig(_)
            | PhaseError::InvalidGeneration(_) => ErrorKind::Validation,
            PhaseError::StackExists(_)
            | PhaseError::InvalidTransition { .. }
            | PhaseError::SessionAlreadyOpen(_)
            | PhaseError::IncompletePhase { .. }
            | PhaseError::ContextLocked { .. } => ErrorKind::StateConflict,
            PhaseError::NotInitialized => ErrorKind::NotInitialized,
            PhaseError::HomeNotFound
            | PhaseError::Io(_)
            | PhaseError::Yaml(_)
            | PhaseError::Json(_)
            | PhaseError::Glob(_)
            | PhaseError::Walk(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code: `1` for anything the user can fix by re-invoking
    /// differently, `2` for locking and internal failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            PhaseError::ContextLocked { .. } => 2,
            _ => match self.kind() {
                ErrorKind::Internal => 2,
                _ => 1,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, PhaseError>;
