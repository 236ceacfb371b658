use crate::cmd::{load_config, open_registry, project_files};
use crate::output::print_json;
use anyhow::Context;
use phase_core::{llm::ContextPayload, materialize::Materializer, resolver};
use std::path::Path;

/// Print what a generator would be handed for `goal`. Always JSON.
pub fn run(root: &Path, registry: Option<&Path>, goal: &str) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;
    let ctx = Materializer::new(root, &config)
        .read()
        .context("failed to read .phase/context.md")?;
    let files = project_files(root)?;
    let rules = resolver::resolve(&registry, &ctx.active_stack, root, &files, &config.rules)
        .with_context(|| format!("failed to resolve rules for '{}'", ctx.active_stack))?;
    print_json(&ContextPayload::new(ctx, rules, goal)?)
}
