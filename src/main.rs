use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::env;
use std::process;

use bundle_slim::cmd::{self, OptimizeOptions};
use bundle_slim::error::ErrorFormatter;

/// Front-end bundle optimizer
///
/// bundle-slim stubs UI components nothing needs, proves the app still
/// builds and serves, and bisects back to a working tree when it does not.
#[derive(Parser)]
#[command(name = "bundle-slim", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Disable emoji output (useful for CI/CD or accessibility)
    #[arg(long, global = true)]
    no_emoji: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Eliminate unused components and verify the result
    Optimize {
        /// Elimination mode: safe, smart, aggressive, nuclear
        #[arg(short, long)]
        mode: Option<String>,

        /// Phases to run, comma separated (baseline is always first)
        #[arg(long, value_delimiter = ',')]
        phases: Vec<String>,

        /// Bound on recovery bisection probes
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Component that must never be stubbed (repeatable)
        #[arg(short, long = "protect", value_name = "NAME")]
        protect: Vec<String>,

        /// Do not mirror backups into the run directory
        #[arg(long)]
        no_backups: bool,

        /// Show what would be stubbed without touching anything
        #[arg(short, long)]
        dry_run: bool,

        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify components and show what a mode would stub
    Analyze {
        /// Elimination mode to plan for
        #[arg(short, long)]
        mode: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write back the originals saved by a run
    Restore {
        /// Run id (defaults to the latest run)
        #[arg(value_name = "RUN_ID")]
        run_id: Option<String>,
    },

    /// Write a default .bundle-slim.toml
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Optimize {
            mode,
            phases,
            max_iterations,
            protect,
            no_backups,
            dry_run,
            json,
        } => cmd::cmd_optimize(&OptimizeOptions {
            mode,
            phases,
            max_iterations,
            protect,
            no_backups,
            dry_run,
            json,
        }),
        Commands::Analyze { mode, json } => cmd::cmd_analyze(&env::current_dir()?, mode.as_deref(), json),
        Commands::Restore { run_id } => cmd::cmd_restore(&env::current_dir()?, run_id.as_deref()).map(|_| ()),
        Commands::Init { force } => cmd::cmd_init(&env::current_dir()?, force),
        Commands::Completions { shell } => {
            cmd::cmd_completions(shell, &mut Cli::command(), &mut std::io::stdout());
            Ok(())
        }
    }
}

fn main() {
    // Initialize logger (use RUST_LOG env var to control verbosity)
    env_logger::init();

    let cli = Cli::parse();

    if cli.no_emoji {
        env::set_var("NO_EMOJI", "1");
    }

    let result = match cli.command {
        Some(command) => run(command),
        None => {
            println!("bundle-slim v{}", env!("CARGO_PKG_VERSION"));
            println!("Front-end bundle optimizer\n");
            println!("Usage: bundle-slim <COMMAND>\n");
            println!("Commands:");
            println!("  optimize     Eliminate unused components and verify the result");
            println!("  analyze      Classify components and show what a mode would stub");
            println!("  restore      Write back the originals saved by a run");
            println!("  init         Write a default .bundle-slim.toml");
            println!("  completions  Generate shell completions");
            println!("\nRun 'bundle-slim <COMMAND> --help' for more information on a command.");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}", ErrorFormatter::format(&e));
        process::exit(ErrorFormatter::exit_code(&e));
    }
}
