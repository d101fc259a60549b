use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

use buildpulse::{
    run_operation, CancelHandle, OperationKind, OperationSpec, Outcome, ProgressSink, TransportKind,
};

/// Track external build and sync commands to a single terminal outcome
#[derive(Parser)]
#[command(name = "buildpulse")]
#[command(about = "Progress tracking for long-running build and sync commands", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a build command and report compile progress
    Build(RunArgs),
    /// Run a synchronization command and report its phases
    Sync(RunArgs),
    /// Forwarding helper: duplicate stdin to stdout and a relay endpoint
    #[command(hide = true)]
    Tee {
        /// Relay endpoint to connect to
        endpoint: PathBuf,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Name used in progress and failure messages
    #[arg(long, default_value = "operation")]
    name: String,

    /// Relay output through a local socket instead of reading stdout directly
    #[arg(long)]
    relay: bool,

    /// Working directory for the command
    #[arg(short = 'C', long)]
    dir: Option<PathBuf>,

    /// Extra environment for the command (KEY=VALUE, repeatable)
    #[arg(short, long)]
    env: Vec<String>,

    /// The command to run
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

/// Progress sink rendering a terminal bar; cumulative percentage is the sum of
/// delivered increments.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Self {
        let bar = ProgressBar::new(100);
        if let Ok(style) =
            ProgressStyle::with_template("{msg:>20} [{bar:40}] {pos:>3}%")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn update(&self, phase: &str, increment: Option<u8>) {
        self.bar.set_message(phase.to_string());
        if let Some(step) = increment {
            self.bar.inc(u64::from(step));
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    // Logs go to stderr; stdout belongs to the forwarded tool output.
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .init();

    let exit_code = match cli.command {
        Commands::Build(args) => run(args, OperationKind::Build).await,
        Commands::Sync(args) => run(args, OperationKind::Sync).await,
        Commands::Tee { endpoint } => match buildpulse::tee::run(&endpoint).await {
            Ok(()) => 0,
            Err(e) => {
                error!("tee helper failed: {e:#}");
                1
            }
        },
    };

    std::process::exit(exit_code);
}

async fn run(args: RunArgs, kind: OperationKind) -> i32 {
    let spec = match build_spec(args, kind) {
        Ok(spec) => spec,
        Err(message) => {
            error!("{message}");
            return 2;
        }
    };
    debug!(operation = %spec.name, command = %spec.command, "starting");

    let cancel = CancelHandle::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let sink = Arc::new(BarSink::new());
    let bar = sink.bar.clone();
    let outcome = run_operation(spec, sink, cancel).await;

    match outcome {
        Outcome::Succeeded => {
            bar.finish_with_message("Done");
            0
        }
        Outcome::Canceled => {
            bar.abandon_with_message("Canceled");
            warn!("operation canceled");
            130
        }
        Outcome::Failed(err) => {
            bar.abandon_with_message("Failed");
            error!("{err}");
            1
        }
        Outcome::TransportError(err) => {
            bar.abandon_with_message("Failed");
            error!("{err}");
            1
        }
    }
}

fn build_spec(args: RunArgs, kind: OperationKind) -> Result<OperationSpec, String> {
    let mut env = HashMap::new();
    for pair in &args.env {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid environment override '{pair}', expected KEY=VALUE"))?;
        env.insert(key.to_string(), value.to_string());
    }

    // Single-argument commands pass through verbatim so shell syntax keeps
    // working; multi-argument commands are quoted word by word.
    let command = if args.command.len() == 1 {
        args.command[0].clone()
    } else {
        shell_words::join(&args.command)
    };

    let mut spec = OperationSpec::new(&args.name, &command, kind).with_transport(
        if args.relay {
            TransportKind::Relay
        } else {
            TransportKind::Direct
        },
    );
    spec.env = env;
    spec.working_dir = args.dir;
    Ok(spec)
}
