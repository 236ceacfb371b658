use crate::error::{PhaseError, Result};
use crate::io;
use crate::paths;
use crate::rule::{self, RuleSource};
use crate::stack::{FileBlob, StackDefinition, StackManifest, TextDocument};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// On-disk catalog of stack bundles, one directory per stack.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, name: &str) -> bool {
        paths::stack_dir(&self.dir, name)
            .join(paths::STACK_CONTEXT)
            .is_file()
    }

    /// Stack names, sorted. Hidden directories (staging leftovers) are skipped.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !self.contains(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    pub fn get(&self, name: &str) -> Result<StackDefinition> {
        if paths::validate_slug(name).is_err() || !paths::stack_dir(&self.dir, name).is_dir() {
            return Err(PhaseError::StackNotFound {
                name: name.to_string(),
                closest: self.closest(name)?,
            });
        }
        load_bundle(&paths::stack_dir(&self.dir, name), name)
    }

    /// Every stack in the registry, validated, in name order.
    pub fn load_all(&self) -> Result<Vec<StackDefinition>> {
        self.list()?.iter().map(|n| self.get(n)).collect()
    }

    /// Install a stack. The bundle is staged next to its final location and
    /// renamed into place so readers never see a half-written stack.
    pub fn put(&self, def: &StackDefinition, overwrite: bool) -> Result<()> {
        def.validate()?;
        io::ensure_dir(&self.dir)?;

        let target = paths::stack_dir(&self.dir, &def.name);
        let existed = target.exists();
        if existed && !overwrite {
            return Err(PhaseError::StackExists(def.name.clone()));
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.dir)?;
        write_bundle(staging.path(), def)?;

        if existed {
            let aside = self
                .dir
                .join(format!(".replaced-{}-{}", def.name, uuid::Uuid::new_v4()));
            std::fs::rename(&target, &aside)?;
            if let Err(e) = std::fs::rename(staging.path(), &target) {
                std::fs::rename(&aside, &target)?;
                return Err(e.into());
            }
            std::fs::remove_dir_all(&aside)?;
        } else {
            std::fs::rename(staging.path(), &target)?;
        }

        tracing::info!(stack = %def.name, replaced = existed, "installed stack");
        Ok(())
    }

    /// Nearest registered name by edit distance, ties broken alphabetically.
    pub fn closest(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|candidate| (levenshtein(name, &candidate), candidate))
            .min()
            .map(|(_, candidate)| candidate))
    }
}

// ---------------------------------------------------------------------------
// Bundle I/O
// ---------------------------------------------------------------------------

fn load_bundle(dir: &Path, name: &str) -> Result<StackDefinition> {
    let invalid = |reason: String| PhaseError::InvalidStack {
        stack: name.to_string(),
        reason,
    };

    let manifest_path = dir.join(paths::STACK_MANIFEST);
    let manifest = if manifest_path.is_file() {
        let data = std::fs::read_to_string(&manifest_path)?;
        let manifest: StackManifest = serde_yaml::from_str(&data)
            .map_err(|e| invalid(format!("{}: {e}", paths::STACK_MANIFEST)))?;
        if manifest.name != name {
            return Err(invalid(format!(
                "{} names '{}' but the directory is '{name}'",
                paths::STACK_MANIFEST,
                manifest.name
            )));
        }
        manifest
    } else {
        StackManifest {
            name: name.to_string(),
            ..StackManifest::default()
        }
    };

    let context_path = dir.join(paths::STACK_CONTEXT);
    if !context_path.is_file() {
        return Err(invalid(format!("missing {}", paths::STACK_CONTEXT)));
    }
    let context =
        StackDefinition::parse_context(name, &std::fs::read_to_string(&context_path)?)?;

    let rules = rule::load_dir(
        &dir.join(paths::STACK_RULES_DIR),
        RuleSource::Stack(name.to_string()),
    )
    .map_err(|e| match e {
        PhaseError::InvalidRule { path, reason } => {
            invalid(format!("{}: {reason}", path.display()))
        }
        other => other,
    })?;

    let def = StackDefinition {
        name: name.to_string(),
        description: manifest.description,
        context,
        signals: manifest.signals,
        rules,
        templates: load_blobs(&dir.join(paths::STACK_TEMPLATES_DIR))?,
        examples: load_blobs(&dir.join(paths::STACK_EXAMPLES_DIR))?,
        guides: load_guides(&dir.join(paths::STACK_GUIDES_DIR))?,
    };
    def.validate()?;
    tracing::debug!(stack = %name, rules = def.rules.len(), "loaded stack");
    Ok(def)
}

fn load_blobs(dir: &Path) -> Result<Vec<FileBlob>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut blobs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        blobs.push(FileBlob {
            path: path.strip_prefix(dir).unwrap_or(path).to_path_buf(),
            contents: std::fs::read(path)?,
        });
    }
    Ok(blobs)
}

fn load_guides(dir: &Path) -> Result<Vec<TextDocument>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut guides = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        guides.push(TextDocument {
            name: stem.to_string(),
            body: std::fs::read_to_string(&path)?,
        });
    }
    guides.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(guides)
}

fn write_bundle(dir: &Path, def: &StackDefinition) -> Result<()> {
    let manifest = serde_yaml::to_string(&def.manifest())?;
    io::atomic_write(&dir.join(paths::STACK_MANIFEST), manifest.as_bytes())?;
    io::atomic_write(
        &dir.join(paths::STACK_CONTEXT),
        def.render_context().as_bytes(),
    )?;

    let rules_dir = dir.join(paths::STACK_RULES_DIR);
    io::ensure_dir(&rules_dir)?;
    for rule in &def.rules {
        io::atomic_write(&rules_dir.join(rule.filename()), rule.render()?.as_bytes())?;
    }
    for (sub, blobs) in [
        (paths::STACK_TEMPLATES_DIR, &def.templates),
        (paths::STACK_EXAMPLES_DIR, &def.examples),
    ] {
        for blob in blobs {
            io::atomic_write(&dir.join(sub).join(&blob.path), &blob.contents)?;
        }
    }
    for guide in &def.guides {
        let path = dir
            .join(paths::STACK_GUIDES_DIR)
            .join(format!("{}.md", guide.name));
        io::atomic_write(&path, guide.body.as_bytes())?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Edit distance
// ---------------------------------------------------------------------------

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
