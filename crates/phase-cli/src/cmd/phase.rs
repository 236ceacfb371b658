use crate::cmd::load_config;
use crate::output::print_json;
use anyhow::Context;
use phase_core::{
    context::ContextPatch,
    machine::PhaseMachine,
    materialize::Materializer,
    types::{PhaseStatus, Strictness, TestsStatus},
};
use std::path::{Path, PathBuf};

fn machine(root: &Path) -> anyhow::Result<PhaseMachine> {
    let config = load_config(root)?;
    Ok(PhaseMachine::new(Materializer::new(root, &config)))
}

pub fn start_session(root: &Path, phase: Option<u32>, json: bool) -> anyhow::Result<()> {
    let session = machine(root)?.start(phase)?;
    if json {
        return print_json(&session);
    }
    println!("Started session {} in {}.", session.id, session.phase.label());
    Ok(())
}

pub fn record(
    root: &Path,
    files: &[PathBuf],
    tests: Option<TestsStatus>,
    json: bool,
) -> anyhow::Result<()> {
    let files = from_cwd(root, files);
    let session = machine(root)?.record_activity(&files, tests)?;
    if json {
        return print_json(&session);
    }
    println!(
        "Recorded {} file(s); session now touches {} (tests: {}).",
        files.len(),
        session.files_touched.len(),
        session.tests
    );
    Ok(())
}

/// Relative arguments name files from the working directory when it lies
/// inside the project, so `record ./users.py` run from `app/` records
/// `app/users.py`. Outside the project they are taken as root-relative.
fn from_cwd(root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    let Ok(cwd) = std::env::current_dir() else {
        return files.to_vec();
    };
    let canonical = root.canonicalize().ok();
    let base = cwd
        .strip_prefix(root)
        .ok()
        .or_else(|| canonical.as_deref().and_then(|c| cwd.strip_prefix(c).ok()));
    let Some(base) = base else {
        return files.to_vec();
    };
    files
        .iter()
        .map(|f| if f.is_absolute() { f.clone() } else { base.join(f) })
        .collect()
}

pub fn complete_session(
    root: &Path,
    status: TestsStatus,
    summary: &str,
    advance: bool,
    json: bool,
) -> anyhow::Result<()> {
    let machine = machine(root)?;
    let logged = machine.end_session(status, summary)?;
    let advanced = if advance {
        Some(
            machine
                .complete(Some(logged.record.phase.index))
                .with_context(|| format!("session {} sealed, but the phase stays open", logged.number))?,
        )
    } else {
        None
    };

    if json {
        return print_json(&serde_json::json!({
            "session": logged,
            "active_phase": advanced,
        }));
    }
    println!(
        "Sealed session {} for {} (tests: {}).",
        logged.number,
        logged.record.phase.label(),
        logged.record.tests
    );
    if let Some(phase) = advanced {
        print_advance(phase);
    }
    Ok(())
}

pub fn complete_phase(root: &Path, phase: Option<u32>, json: bool) -> anyhow::Result<()> {
    let active = machine(root)?.complete(phase)?;
    if json {
        return print_json(&serde_json::json!({ "active_phase": active }));
    }
    print_advance(active);
    Ok(())
}

fn print_advance(active: phase_core::types::PhaseRef) {
    if active.status == PhaseStatus::Complete {
        println!("Every planned phase is complete.");
    } else {
        println!("Phase complete. Next: {}.", active.label());
    }
}

pub fn strictness(root: &Path, level: Strictness, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let ctx = Materializer::new(root, &config)
        .update(ContextPatch::strictness(level))
        .context("failed to update strictness")?;
    if json {
        return print_json(&serde_json::json!({ "strictness": ctx.strictness }));
    }
    println!("Strictness: {}", ctx.strictness);
    println!("  {}", ctx.strictness.guidance());
    Ok(())
}
