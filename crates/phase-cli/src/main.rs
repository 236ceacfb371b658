mod cmd;
mod output;
mod root;

use clap::{ArgGroup, Parser, Subcommand};
use cmd::{registry::RegistrySubcommand, setup::SetupArgs, stack::StackSubcommand};
use phase_core::{
    types::{Strictness, TestsStatus},
    PhaseError,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "phase",
    about = "Phase-based development with stack-aware rules: set up a project, then work it phase by phase",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .phase/ or .git/)
    #[arg(long, global = true, env = "PHASE_ROOT")]
    root: Option<PathBuf>,

    /// Stack registry directory (default: config, then .phase/stacks, then ~/.phase/stacks)
    #[arg(long, global = true, env = "PHASE_REGISTRY")]
    registry: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project context and materialize the stack's rules
    #[command(group(
        ArgGroup::new("source")
            .required(true)
            .multiple(true)
            .args(["stack", "detect", "from_plan"])
    ))]
    Setup {
        /// Stack name from the registry
        stack: Option<String>,

        /// Pick the stack by inspecting the project
        #[arg(long, conflicts_with_all = ["stack", "from_plan"])]
        detect: bool,

        /// With --detect: register the observed conventions as a new stack
        #[arg(long, value_name = "NAME", requires = "detect")]
        create: Option<String>,

        /// Phase plan file (YAML)
        #[arg(long, value_name = "FILE")]
        from_plan: Option<PathBuf>,

        /// Initial strictness (overrides the plan)
        #[arg(long)]
        strictness: Option<Strictness>,
    },

    /// Inspect the project and report which stack it looks like
    Detect,

    /// Re-resolve the active stack's rules and rewrite .phase/rules
    ResolveRules,

    /// Start (or resume) a phase and open a session in it
    StartSession {
        /// Phase index; defaults to the active phase
        #[arg(long)]
        phase: Option<u32>,
    },

    /// Record touched files and test results in the open session
    Record {
        /// Latest test outcome: passing, failing or not_run
        #[arg(long)]
        tests: Option<TestsStatus>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Seal the open session
    CompleteSession {
        /// Test outcome at the end of the session
        #[arg(long)]
        status: TestsStatus,

        #[arg(long)]
        summary: String,

        /// Also complete the phase once the session is sealed
        #[arg(long)]
        advance: bool,
    },

    /// Complete the active phase and move to the next one
    CompletePhase {
        #[arg(long)]
        phase: Option<u32>,
    },

    /// Set rule enforcement strictness: high, medium or low
    Strictness { level: Strictness },

    /// Show the context, active phase and latest session
    Status,

    /// Inspect the stack registry
    Stack {
        #[command(subcommand)]
        subcommand: StackSubcommand,
    },

    /// Manage the stack registry
    Registry {
        #[command(subcommand)]
        subcommand: RegistrySubcommand,
    },

    /// Print the generator payload for a goal as JSON
    Payload {
        #[arg(long)]
        goal: String,
    },
}

fn main() {
    // Usage errors are user errors (exit 1); help and version go to stdout (exit 0).
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let registry = cli.registry.as_deref();
    let json = cli.json;

    let result = match cli.command {
        Commands::Setup {
            stack,
            detect,
            create,
            from_plan,
            strictness,
        } => cmd::setup::run(
            &root,
            registry,
            SetupArgs {
                stack,
                detect,
                create,
                from_plan,
                strictness,
            },
            json,
        ),
        Commands::Detect => cmd::detect::run(&root, registry, json),
        Commands::ResolveRules => cmd::rules::run(&root, registry, json),
        Commands::StartSession { phase } => cmd::phase::start_session(&root, phase, json),
        Commands::Record { tests, files } => cmd::phase::record(&root, &files, tests, json),
        Commands::CompleteSession {
            status,
            summary,
            advance,
        } => cmd::phase::complete_session(&root, status, &summary, advance, json),
        Commands::CompletePhase { phase } => cmd::phase::complete_phase(&root, phase, json),
        Commands::Strictness { level } => cmd::phase::strictness(&root, level, json),
        Commands::Status => cmd::status::run(&root, json),
        Commands::Stack { subcommand } => cmd::stack::run(&root, registry, subcommand, json),
        Commands::Registry { subcommand } => cmd::registry::run(&root, registry, subcommand, json),
        Commands::Payload { goal } => cmd::payload::run(&root, registry, &goal),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        let code = e
            .downcast_ref::<PhaseError>()
            .map(PhaseError::exit_code)
            .unwrap_or(2);
        std::process::exit(code);
    }
}
