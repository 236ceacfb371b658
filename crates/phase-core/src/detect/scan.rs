use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directories that never carry project signal.
const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "target",
    "venv",
    "__pycache__",
    "dist",
    "build",
    "vendor",
];

fn skipped(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

/// Project-relative files under `root`, sorted, stopping after `max_entries`
/// directory entries. Hidden and dependency directories are pruned.
pub fn project_files(root: &Path, max_entries: usize) -> Result<Vec<PathBuf>> {
    let (files, truncated) = walk(root, max_entries)?;
    if truncated {
        tracing::debug!(limit = max_entries, files = files.len(), "walk stopped at the entry cap");
    }
    Ok(files)
}

/// Every project file under `root`, sorted, with the same pruning as
/// [`project_files`] but no entry cap. Rule globs are matched against this.
pub fn all_project_files(root: &Path) -> Result<Vec<PathBuf>> {
    Ok(walk(root, usize::MAX)?.0)
}

fn walk(root: &Path, max_entries: usize) -> Result<(Vec<PathBuf>, bool)> {
    let mut files = Vec::new();
    let mut truncated = false;
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || !(e.file_type().is_dir() && skipped(&e.file_name().to_string_lossy()))
        });
    for (seen, entry) in walker.enumerate() {
        if seen >= max_entries {
            truncated = true;
            break;
        }
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    files.sort();
    Ok((files, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn prunes_hidden_and_dependency_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for f in [
            "app/main.py",
            "node_modules/express/index.js",
            ".git/HEAD",
            ".phase/context.md",
            "tests/test_main.py",
        ] {
            let p = root.join(f);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "x").unwrap();
        }
        std::fs::write(root.join(".eslintrc.json"), "{}").unwrap();

        let files = project_files(root, 100).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from(".eslintrc.json"),
                PathBuf::from("app/main.py"),
                PathBuf::from("tests/test_main.py"),
            ]
        );
    }

    #[test]
    fn stops_at_entry_cap() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        // The root itself counts as one entry.
        assert_eq!(project_files(dir.path(), 4).unwrap().len(), 3);
        assert_eq!(all_project_files(dir.path()).unwrap().len(), 10);
    }
}
