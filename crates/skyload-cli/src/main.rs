mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{CommandResult, Context};
use skyload_config::DEFAULT_SETTINGS_FILE;
use skyload_core::{install_signal_handler, CancelToken};
use skyload_warehouse::StageSelection;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "skyload",
    version,
    about = "Provision, validate, load, and tear down an analytical warehouse cluster"
)]
struct Cli {
    /// Path to the settings file.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE, global = true)]
    config: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the trust role and cluster, open ingress, and test the connection.
    Create,
    /// Delete the cluster and wait until it is gone.
    Delete {
        /// Skip the confirmation prompt.
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
        /// Take a final snapshot with this identifier before deleting.
        #[arg(long)]
        final_snapshot: Option<String>,
    },
    /// Describe the cluster and test the connection.
    Status,
    /// Test the connection to the cluster endpoint.
    Test,
    /// Build the star schema and load it from the configured buckets.
    Etl {
        /// Stages to run: all, schema (drop + create), or load (copy + insert).
        #[arg(long, default_value = "all", value_parser = parse_stage)]
        stage: StageSelection,
        /// Print the statements instead of executing them.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the parsed settings with the password masked.
    Settings,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn parse_stage(raw: &str) -> Result<StageSelection, String> {
    StageSelection::parse(raw)
        .ok_or_else(|| format!("unknown stage '{raw}' (expected: all, schema, load)"))
}

/// Load settings, wire up the clients, and arm Ctrl-C before a lifecycle command.
fn with_context(config: &Path, command: impl FnOnce(&Context) -> CommandResult) -> CommandResult {
    let cancel = CancelToken::new();
    install_signal_handler(&cancel);
    command(&Context::load(config, cancel)?)
}

fn run(cli: &Cli) -> CommandResult {
    let json = cli.json;
    let config = cli.config.as_path();
    match cli.command {
        Commands::Create => with_context(config, |ctx| commands::create::run(ctx, json)),
        Commands::Delete {
            yes,
            ref final_snapshot,
        } => with_context(config, |ctx| {
            commands::delete::run(ctx, yes, final_snapshot.as_deref(), json)
        }),
        Commands::Status => with_context(config, |ctx| commands::status::run(ctx, json)),
        Commands::Test => with_context(config, |ctx| commands::test::run(ctx, json)),
        Commands::Etl { stage, dry_run } => {
            with_context(config, |ctx| commands::etl::run(ctx, stage, dry_run, json))
        }
        Commands::Settings => commands::settings::run(config, json),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { ref dir } => commands::man_pages::run::<Cli>(dir),
    }
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SKYLOAD_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {failure}");
            ExitCode::from(failure.code)
        }
    }
}
