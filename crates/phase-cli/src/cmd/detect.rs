use crate::cmd::{load_config, open_registry};
use crate::output::{print_json, print_table};
use anyhow::Context;
use phase_core::detect::{self, DetectionReport};
use std::path::Path;

pub fn run(root: &Path, registry: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;
    let stacks = registry.load_all().context("failed to load the stack registry")?;
    let report = detect::detect(root, &stacks, &config.detection)
        .with_context(|| format!("failed to inspect {}", root.display()))?;

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &DetectionReport) {
    match (&report.matched_stack, report.ties.is_empty()) {
        (Some(name), _) => println!("Matched:      {name} ({:.2})", report.confidence),
        (None, false) => println!("Matched:      ambiguous ({})", report.ties.join(", ")),
        (None, true) => println!("Matched:      none (best {:.2})", report.confidence),
    }
    let or_dash = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    println!("Language:     {}", or_dash(report.observed_language.clone()));
    println!("Framework:    {}", or_dash(report.observed_framework.clone()));
    println!("Naming:       {}", or_dash(report.observed_naming.map(|n| n.to_string())));
    println!("Indentation:  {}", or_dash(report.observed_indentation.map(|i| i.to_string())));
    println!("Architecture: {}", report.observed_architecture);
    if !report.manifests.is_empty() {
        println!("Manifests:    {}", report.manifests.join(", "));
    }
    if !report.tooling.is_empty() {
        println!("Tooling:      {}", report.tooling.join(", "));
    }
    if !report.sampled_files.is_empty() {
        let sampled: Vec<String> = report
            .sampled_files
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        println!("Sampled:      {}", sampled.join(", "));
    }

    if report.candidates.is_empty() {
        return;
    }
    println!();
    let rows = report
        .candidates
        .iter()
        .map(|c| {
            vec![
                c.stack.clone(),
                format!("{}/{}", c.agreeing, c.evidenced),
                format!("{:.2}", c.confidence()),
            ]
        })
        .collect();
    print_table(&["STACK", "SIGNALS", "CONFIDENCE"], rows);
}
