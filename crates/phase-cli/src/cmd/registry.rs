use crate::cmd::{load_config, open_registry};
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use phase_core::builtin;
use std::path::Path;

#[derive(Subcommand)]
pub enum RegistrySubcommand {
    /// Install the built-in stacks
    Seed {
        /// Overwrite stacks that already exist
        #[arg(long)]
        force: bool,
    },
}

pub fn run(
    root: &Path,
    registry: Option<&Path>,
    subcmd: RegistrySubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let registry = open_registry(root, &config, registry)?;
    match subcmd {
        RegistrySubcommand::Seed { force } => {
            let report = builtin::seed(&registry, force)
                .with_context(|| format!("failed to seed {}", registry.dir().display()))?;
            if json {
                return print_json(&report);
            }
            for name in &report.installed {
                println!("  installed: {name}");
            }
            for name in &report.skipped {
                println!("  exists:    {name}");
            }
            println!("Registry: {}", registry.dir().display());
            Ok(())
        }
    }
}
