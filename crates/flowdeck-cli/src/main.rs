mod cmd;
mod output;
mod root;

use clap::{ArgAction, Parser};
use flowdeck_core::FlowdeckError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "flowdeck",
    about = "Install, upgrade and remove the workflow server, worker, OAuth2 proxy and ingress",
    version,
    after_help = "Run 'flowdeck help' to list operations and resolved parameters."
)]
struct Cli {
    /// Project root that relative file parameters resolve against
    /// (default: nearest directory containing flowdeck.yaml, else cwd)
    #[arg(long, env = "FLOWDECK_ROOT")]
    root: Option<PathBuf>,

    /// Settings file (default: <root>/flowdeck.yaml)
    #[arg(long, env = "FLOWDECK_CONFIG")]
    config: Option<PathBuf>,

    /// Override a parameter; repeatable
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Print every helm/kubectl invocation instead of running it
    #[arg(long)]
    dry_run: bool,

    /// Output as JSON
    #[arg(long, short = 'j')]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Operations to run, in order, mixed with NAME=VALUE overrides
    #[arg(value_name = "TARGET")]
    targets: Vec<String>,
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FlowdeckError>() {
        Some(FlowdeckError::CommandFailed { code, .. }) => *code,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    // RUST_LOG replaces the default level; -v raises it on top.
    let mut filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    if cli.verbose > 0 {
        filter = filter.add_directive(default_level.into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = cmd::run::run(
        &root,
        cmd::run::RunArgs {
            tokens: cli.targets,
            set: cli.set,
            config: cli.config,
            dry_run: cli.dry_run,
            json: cli.json,
        },
    );

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}
