use crate::cmd::{load_config, open_registry};
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum StackSubcommand {
    /// List stacks in the registry
    List,
    /// Show one stack's context and rules
    Show { name: String },
}

pub fn run(
    root: &Path,
    registry: Option<&Path>,
    subcmd: StackSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;
    match subcmd {
        StackSubcommand::List => {
            let stacks = registry.load_all().context("failed to load the stack registry")?;
            if json {
                let manifests: Vec<_> = stacks.iter().map(|s| s.manifest()).collect();
                return print_json(&manifests);
            }
            if stacks.is_empty() {
                println!("No stacks in {}. Run 'phase registry seed'.", registry.dir().display());
                return Ok(());
            }
            let rows = stacks
                .iter()
                .map(|s| {
                    vec![
                        s.name.clone(),
                        s.context.language.clone(),
                        s.context.framework.clone().unwrap_or_default(),
                        s.rules.len().to_string(),
                    ]
                })
                .collect();
            print_table(&["NAME", "LANGUAGE", "FRAMEWORK", "RULES"], rows);
            Ok(())
        }
        StackSubcommand::Show { name } => {
            let def = registry.get(&name)?;
            if json {
                return print_json(&def);
            }
            print!("{}", def.render_context());
            println!();
            println!("## Rules");
            for rule in &def.rules {
                let scope = rule.glob.as_deref().unwrap_or("always");
                let desc = rule.description.as_deref().unwrap_or("");
                println!("- {} [{scope}] {desc}", rule.id);
            }
            for t in &def.templates {
                println!("- template: {}", t.path.display());
            }
            Ok(())
        }
    }
}
