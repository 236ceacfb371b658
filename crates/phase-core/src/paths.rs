use crate::error::{PhaseError, Result};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Project layout
// ---------------------------------------------------------------------------

pub const PHASE_DIR: &str = ".phase";
pub const CONTEXT_FILE: &str = ".phase/context.md";
pub const CONTEXT_LOCK_FILE: &str = ".phase/context.md.lock";
pub const CONFIG_FILE: &str = ".phase/config.yaml";
pub const RULES_DIR: &str = ".phase/rules";
pub const OPEN_SESSION_FILE: &str = ".phase/session.yaml";
pub const SESSIONS_DIR: &str = ".phase/sessions";
pub const LOCAL_REGISTRY_DIR: &str = ".phase/stacks";

// ---------------------------------------------------------------------------
// Stack bundle layout
// ---------------------------------------------------------------------------

pub const STACK_MANIFEST: &str = "stack.yaml";
pub const STACK_CONTEXT: &str = "context.md";
pub const STACK_RULES_DIR: &str = "rules";
pub const STACK_TEMPLATES_DIR: &str = "templates";
pub const STACK_EXAMPLES_DIR: &str = "examples";
pub const STACK_GUIDES_DIR: &str = "guides";

/// User-level registry, relative to the home directory.
pub const USER_REGISTRY_DIR: &str = ".phase/stacks";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn phase_dir(root: &Path) -> PathBuf {
    root.join(PHASE_DIR)
}

pub fn context_path(root: &Path) -> PathBuf {
    root.join(CONTEXT_FILE)
}

pub fn context_lock_path(root: &Path) -> PathBuf {
    root.join(CONTEXT_LOCK_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn rules_dir(root: &Path) -> PathBuf {
    root.join(RULES_DIR)
}

pub fn open_session_path(root: &Path) -> PathBuf {
    root.join(OPEN_SESSION_FILE)
}

pub fn sessions_dir(root: &Path) -> PathBuf {
    root.join(SESSIONS_DIR)
}

pub fn local_registry_dir(root: &Path) -> PathBuf {
    root.join(LOCAL_REGISTRY_DIR)
}

pub fn user_registry_dir() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(USER_REGISTRY_DIR))
        .ok_or(PhaseError::HomeNotFound)
}

pub fn stack_dir(registry: &Path, name: &str) -> PathBuf {
    registry.join(name)
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(PhaseError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Render `path` relative to `root` with forward slashes, the form rule globs
/// and deliverables are written against. `.` segments are dropped and `..`
/// folds into its parent.
pub fn relative_slash(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut parts: Vec<String> = Vec::new();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if parts.last().is_some_and(|p| p != ".." && p != "/") => {
                parts.pop();
            }
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    parts.join("/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        for slug in ["python-fastapi", "go-gin", "x", "terraform2"] {
            validate_slug(slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in ["", "-node", "node-", "Node", "java spring", "java_spring"] {
            assert!(validate_slug(slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            context_path(root),
            PathBuf::from("/tmp/proj/.phase/context.md")
        );
        assert_eq!(
            stack_dir(Path::new("/reg"), "go-gin"),
            PathBuf::from("/reg/go-gin")
        );
    }

    #[test]
    fn relative_slash_strips_root() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            relative_slash(root, Path::new("/tmp/proj/app/api/auth.py")),
            "app/api/auth.py"
        );
    }

    #[test]
    fn relative_slash_drops_dot_segments() {
        let root = Path::new("/tmp/proj");
        assert_eq!(relative_slash(root, Path::new("./app/main.py")), "app/main.py");
        assert_eq!(relative_slash(root, Path::new("app/./api/../main.py")), "app/main.py");
        assert_eq!(
            relative_slash(root, Path::new("/tmp/proj/./app/main.py")),
            "app/main.py"
        );
        assert_eq!(relative_slash(root, Path::new("../other/x.py")), "../other/x.py");
    }
}
