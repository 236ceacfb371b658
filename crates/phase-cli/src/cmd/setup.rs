use crate::cmd::{load_config, materialize_rules, open_registry};
use crate::output::print_json;
use anyhow::Context;
use phase_core::{
    config::Config,
    context::{ContextPatch, ProjectContext},
    detect::{self, DetectionReport},
    io,
    materialize::Materializer,
    paths,
    plan::PhasePlan,
    registry::Registry,
    stack::StackDefinition,
    types::Strictness,
    PhaseError,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub struct SetupArgs {
    pub stack: Option<String>,
    pub detect: bool,
    pub create: Option<String>,
    pub from_plan: Option<PathBuf>,
    pub strictness: Option<Strictness>,
}

#[derive(Serialize)]
struct SetupOutput {
    stack: String,
    created: bool,
    strictness: Strictness,
    active_phase: String,
    phases: usize,
    rules: usize,
    rules_written: usize,
    templates_written: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detected: Option<DetectionReport>,
}

pub fn run(root: &Path, registry: Option<&Path>, args: SetupArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;

    let plan = args
        .from_plan
        .as_deref()
        .map(|p| PhasePlan::load(p).with_context(|| format!("failed to load plan {}", p.display())))
        .transpose()?;

    let mut detected = None;
    let stack_name = if args.detect {
        let report = run_detection(root, &registry, &config)?;
        let name = match &args.create {
            Some(name) => {
                let def = StackDefinition::from_detection(name, &report)?;
                registry
                    .put(&def, false)
                    .with_context(|| format!("failed to add stack '{name}' to the registry"))?;
                name.clone()
            }
            None => chosen_stack(&report)?,
        };
        detected = Some(report);
        name
    } else {
        args.stack
            .clone()
            .or_else(|| plan.as_ref().and_then(|p| p.stack.clone()))
            .ok_or_else(|| {
                PhaseError::InvalidValue(
                    "no stack given: pass <stack>, --detect, or a plan with a 'stack:' entry"
                        .to_string(),
                )
            })?
    };

    let def = registry.get(&stack_name)?;
    let strictness = args.strictness.or(plan.as_ref().and_then(|p| p.strictness));
    let phases = plan.map(|p| p.phases);

    io::ensure_dir(&paths::phase_dir(root))?;
    if !paths::config_path(root).exists() {
        config.save(root).context("failed to write .phase/config.yaml")?;
    }
    io::ensure_gitignore_entry(root, paths::CONTEXT_LOCK_FILE)?;

    let materializer = Materializer::new(root, &config);
    let created = !materializer.is_initialized();
    let ctx = if created {
        let mut ctx = ProjectContext::new(&def);
        if let Some(level) = strictness {
            ctx.strictness = level;
        }
        if let Some(phases) = phases {
            ctx.plan = phases;
        }
        ctx.detected = detected.clone();
        materializer.write(&ctx).context("failed to write .phase/context.md")?;
        ctx
    } else {
        // Re-running setup refreshes the stack snapshot and keeps phase progress.
        materializer
            .update(ContextPatch {
                stack: Some((def.name.clone(), def.context.clone())),
                strictness,
                plan: phases,
                detected: detected.clone().map(Some),
                ..ContextPatch::default()
            })
            .context("failed to update .phase/context.md")?
    };

    let templates_written = scaffold(root, &def)?;
    let (resolved, written) = materialize_rules(&materializer, &registry, &def.name, &config)?;
    tracing::info!(stack = %def.name, created, rules = resolved.rules.len(), "setup complete");

    let out = SetupOutput {
        stack: def.name.clone(),
        created,
        strictness: ctx.strictness,
        active_phase: ctx.active_phase.to_string(),
        phases: ctx.plan.len(),
        rules: resolved.rules.len(),
        rules_written: written.len(),
        templates_written,
        detected,
    };
    if json {
        return print_json(&out);
    }

    let verb = if out.created { "Initialized" } else { "Updated" };
    println!("{verb} {} with stack '{}'.", root.display(), out.stack);
    println!("  strictness: {}", out.strictness);
    println!("  phase:      {}", out.active_phase);
    if out.phases > 0 {
        println!("  plan:       {} phases", out.phases);
    }
    println!("  rules:      {} ({} written)", out.rules, out.rules_written);
    for t in &out.templates_written {
        println!("  created:    {}", t.display());
    }
    Ok(())
}

fn run_detection(root: &Path, registry: &Registry, config: &Config) -> anyhow::Result<DetectionReport> {
    let stacks = registry.load_all().context("failed to load the stack registry")?;
    let report = detect::detect(root, &stacks, &config.detection)
        .with_context(|| format!("failed to inspect {}", root.display()))?;
    Ok(report)
}

/// The detected stack, refusing ties and weak matches.
fn chosen_stack(report: &DetectionReport) -> Result<String, PhaseError> {
    if let Some(name) = &report.matched_stack {
        return Ok(name.clone());
    }
    let reason = if !report.ties.is_empty() {
        format!(
            "detection is ambiguous between {}; pass one of them explicitly",
            report.ties.join(", ")
        )
    } else {
        match report.candidates.first() {
            Some(best) => format!(
                "no stack matched with enough confidence (best: {} at {:.2}); pass a stack or use --create <name>",
                best.stack,
                best.confidence()
            ),
            None => "the registry is empty; run 'phase registry seed' first".to_string(),
        }
    };
    Err(PhaseError::InvalidValue(reason))
}

/// Copy the stack's templates into the project without touching existing
/// files.
fn scaffold(root: &Path, def: &StackDefinition) -> anyhow::Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for blob in &def.templates {
        let target = root.join(&blob.path);
        if io::write_if_missing(&target, &blob.contents)
            .with_context(|| format!("failed to write {}", target.display()))?
        {
            written.push(blob.path.clone());
        }
    }
    Ok(written)
}
