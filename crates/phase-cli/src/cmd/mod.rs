pub mod detect;
pub mod payload;
pub mod phase;
pub mod registry;
pub mod rules;
pub mod setup;
pub mod stack;
pub mod status;

use anyhow::Context;
use phase_core::{
    config::Config,
    detect::scan,
    materialize::Materializer,
    registry::Registry,
    resolver::{self, ResolvedRuleSet},
};
use std::path::{Path, PathBuf};

/// Config for the project, or the defaults before `setup` has run. Error-level
/// findings refuse the config; warnings are logged.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load_or_default(root).context("failed to load .phase/config.yaml")?;
    let warnings = config.check().context("refusing .phase/config.yaml")?;
    for warning in warnings {
        tracing::warn!(level = ?warning.level, "{}", warning.message);
    }
    Ok(config)
}

pub fn open_registry(root: &Path, config: &Config, explicit: Option<&Path>) -> anyhow::Result<Registry> {
    let dir = config.registry_dir(root, explicit)?;
    tracing::debug!(registry = %dir.display(), "using registry");
    Ok(Registry::open(dir))
}

/// The full file list rule globs are matched against. The detection walk cap
/// does not apply here.
pub fn project_files(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    scan::all_project_files(root).with_context(|| format!("failed to walk {}", root.display()))
}

/// Resolve the rules for `stack` against the current tree and mirror them
/// into `.phase/rules/`. Returns the rule set and the files written.
pub fn materialize_rules(
    materializer: &Materializer,
    registry: &Registry,
    stack: &str,
    config: &Config,
) -> anyhow::Result<(ResolvedRuleSet, Vec<PathBuf>)> {
    let root = materializer.root();
    let files = project_files(root)?;
    let resolved = resolver::resolve(registry, stack, root, &files, &config.rules)
        .with_context(|| format!("failed to resolve rules for '{stack}'"))?;
    let written = materializer
        .write_rules(&resolved)
        .context("failed to write .phase/rules")?;
    Ok((resolved, written))
}
