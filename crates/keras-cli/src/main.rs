//! CLI entry point for the embedded Keras runtime.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keras_bridge::{BridgeError, InvocationDispatcher, RuntimeConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    author = "keras-bridge developers",
    version,
    about = "Drive an embedded Keras runtime from the command line",
    long_about = "Starts the embedded Python runtime, imports Keras and issues calls against it.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  KERAS_BRIDGE_MODULE          Root module (default: tensorflow.keras)\n  \
                  KERAS_BRIDGE_PYTHON          Interpreter used to repair the install\n  \
                  KERAS_BRIDGE_CAPTURE_OUTPUT  Capture the runtime's stdout/stderr\n\n\
                  EXAMPLES:\n  \
                  # Check that the runtime comes up\n  \
                  keras-cli probe\n\n  \
                  # Call a function below the root module\n  \
                  keras-cli call activations.get -p identifier=relu\n\n  \
                  # Print the shapes of a built-in dataset\n  \
                  keras-cli --json dataset mnist"
)]
struct Args {
    /// JSON configuration file (overrides the environment)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root module every call path is resolved against
    #[arg(long, value_name = "NAME")]
    module: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Print results as JSON on stdout
    ///
    /// Disables all logging so stdout only carries the result.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the runtime and report what was imported
    Probe,

    /// Invoke a dotted path below the root module
    Call {
        /// Dotted path, e.g. `layers.Dense`
        path: String,

        /// Call this method on the object `path` names
        #[arg(long)]
        method: Option<String>,

        /// Argument as name=JSON; the first one is passed positionally
        #[arg(short = 'p', long = "param", value_name = "NAME=JSON")]
        params: Vec<String>,
    },

    /// Load a built-in dataset and print its array shapes
    Dataset {
        /// Dataset name, e.g. `mnist`
        name: String,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the runtime configuration: file, else environment, then `--module`.
fn load_config(file: Option<&Path>, module: Option<&str>) -> Result<RuntimeConfig> {
    let mut config = match file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str::<RuntimeConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => RuntimeConfig::from_env()?,
    };

    if let Some(module) = module {
        config.root_module = module.to_string();
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args.config.as_deref(), args.module.as_deref())?;
    debug!(?config, "Runtime configuration");

    let runtime = keras_bridge::python::runtime(config)?;
    let d = InvocationDispatcher::new(runtime.acquire()?);

    match &args.command {
        Command::Probe => {
            let report = commands::probe(&d)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Backend:     {}", report.backend);
                println!("Root module: {}", report.root_module);
                println!("Version:     {}", report.version.as_deref().unwrap_or("unknown"));
                println!("Modules:     {}", report.modules.join(", "));
            }
        }
        Command::Call { path, method, params } => {
            let result = commands::call(&d, path, method.as_deref(), params)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            } else {
                println!("{result}");
            }
        }
        Command::Dataset { name } => {
            let report = commands::dataset(&d, name)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let fmt = |dims: &[Option<usize>]| {
                    keras_bridge::Shape::new(dims.iter().copied()).to_string()
                };
                println!("Dataset: {}", report.name);
                println!("  x_train: {}", fmt(&report.x_train));
                println!("  y_train: {}", fmt(&report.y_train));
                println!("  x_test:  {}", fmt(&report.x_test));
                println!("  y_test:  {}", fmt(&report.y_test));
            }
        }
    }

    let token = d.token();
    let stdout = token.captured_stdout();
    if !stdout.is_empty() {
        info!(output = %stdout.trim_end(), "Runtime stdout");
    }
    Ok(())
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<BridgeError>().is_some_and(BridgeError::is_fatal)
}

/// Print `err` as `{"error": {...}}` or log it, and pick the exit code.
fn report_error(err: &anyhow::Error, json_output: bool) -> ExitCode {
    let bridge = err.downcast_ref::<BridgeError>();
    let fatal = is_fatal(err);

    if json_output {
        let code = bridge.map_or("ERROR", BridgeError::code);
        let body = json!({ "error": { "code": code, "message": format!("{err:#}"), "fatal": fatal } });
        println!("{body}");
    } else if fatal {
        error!("Fatal: {err:#}");
    } else {
        error!("{err:#}");
    }

    ExitCode::from(exit_status(fatal))
}

fn exit_status(fatal: bool) -> u8 {
    if fatal { 2 } else { 1 }
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err, args.json),
    }
}
