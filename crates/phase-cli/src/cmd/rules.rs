use crate::cmd::{load_config, materialize_rules, open_registry};
use crate::output::{print_json, print_table};
use anyhow::Context;
use phase_core::materialize::Materializer;
use std::path::Path;

pub fn run(root: &Path, registry: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;
    let materializer = Materializer::new(root, &config);
    let ctx = materializer.read().context("failed to read .phase/context.md")?;
    let (resolved, written) = materialize_rules(&materializer, &registry, &ctx.active_stack, &config)?;

    if json {
        return print_json(&serde_json::json!({
            "resolved": resolved,
            "written": written,
        }));
    }

    let rows = resolved
        .rules
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.glob.clone().unwrap_or_else(|| "always".to_string()),
                r.source.to_string(),
            ]
        })
        .collect();
    print_table(&["RULE", "APPLIES", "SOURCE"], rows);
    for o in &resolved.overrides {
        println!("override: {} ({} replaces {})", o.id, o.winner, o.loser);
    }
    for s in &resolved.skipped {
        println!("skipped:  {} from {}: {}", s.id, s.source, s.reason);
    }
    println!("{} rule file(s) written.", written.len());
    Ok(())
}
