//! CLI entry point for pathwatch.
//!
//! Watches one path and prints every changed path to standard output, one
//! per line, until interrupted.
//!
//! # Usage
//!
//! ```bash
//! pathwatch [OPTIONS] <PATH>
//!
//! # Print each changed path as soon as it is reported
//! pathwatch ./src
//!
//! # Coalesce bursts for 100ms, skip VCS and build output, show kinds
//! pathwatch --latency-ms 100 --exclude .git --exclude target --format kind .
//!
//! # Report containing directories as JSON lines
//! pathwatch --dirs --format json /srv/app
//! ```
//!
//! # Exit codes
//!
//! | code | meaning |
//! |------|---------|
//! | 1    | usage or configuration error, fatal backend error |
//! | 2    | path missing, inaccessible or not watchable |
//! | 130  | interrupted (SIGINT) |
//! | 143  | terminated (SIGTERM) |

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, ValueEnum};
use pw_core::{Config, ConfigError, Granularity, OutputFormat, WatchTarget};
use pw_watcher::{NotifySource, Normalizer, WatchError, WatchHandle, WriterSink};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// EXIT CODES
// =============================================================================

const EXIT_USAGE: u8 = 1;
const EXIT_INVALID_PATH: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;
const EXIT_TERMINATED: u8 = 143;

/// Printed once the native watch is live.
const READY_LINE: &str = "Initialized";

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watch a path and print each changed path as it changes.
#[derive(Parser, Debug)]
#[command(name = "pathwatch", version, about, long_about = None)]
struct Cli {
    /// Path to watch (file or directory).
    path: Utf8PathBuf,

    /// Coalescing window in milliseconds; 0 prints every change immediately.
    #[arg(long, env = "PATHWATCH_LATENCY_MS", value_name = "MS")]
    latency_ms: Option<u64>,

    /// Watch only the top level of a directory.
    #[arg(long)]
    non_recursive: bool,

    /// Skip paths under this relative prefix, or containing this segment.
    ///
    /// May be given more than once.
    #[arg(long, value_name = "PATTERN")]
    exclude: Vec<String>,

    /// Output line format.
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Report the directory containing each changed file instead of the file.
    #[arg(long)]
    dirs: bool,

    /// JSON configuration file; command-line options override it.
    #[arg(long, env = "PATHWATCH_CONFIG", value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    /// Do not print the ready line once watching has started.
    #[arg(long)]
    no_ready_line: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored log output.
    #[arg(long)]
    no_color: bool,
}

/// Output line format.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    /// The path alone.
    Plain,
    /// The change kind, then the path.
    Kind,
    /// One JSON object per line.
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Plain => Self::Plain,
            Format::Kind => Self::Kind,
            Format::Json => Self::Json,
        }
    }
}

/// Why the watch loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupted,
    Terminated,
}

impl Shutdown {
    const fn exit_code(self) -> u8 {
        match self {
            Self::Interrupted => EXIT_INTERRUPTED,
            Self::Terminated => EXIT_TERMINATED,
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default. Logs go
/// to stderr so stdout carries only paths.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the optional config file and CLI overrides.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed, or if the
/// merged configuration is invalid.
fn build_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    if let Some(latency_ms) = cli.latency_ms {
        config.watch.latency_ms = latency_ms;
    }
    if cli.non_recursive {
        config.watch.recursive = false;
    }
    if cli.dirs {
        config.watch.granularity = Granularity::Directory;
    }
    config.watch.exclude.extend(cli.exclude.iter().cloned());
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }
    if cli.no_ready_line {
        config.output.ready_line = false;
    }

    config.validate()?;
    Ok(config)
}

/// Maps a failed run to its exit code.
fn exit_code_for(report: &color_eyre::Report) -> u8 {
    if report
        .downcast_ref::<WatchError>()
        .is_some_and(WatchError::is_target_error)
    {
        EXIT_INVALID_PATH
    } else {
        EXIT_USAGE
    }
}

// =============================================================================
// WATCH LOOP
// =============================================================================

/// Runs one watch session until a signal or a fatal error.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the path cannot be
/// watched, or the backend fails.
async fn run(cli: &Cli) -> color_eyre::Result<Shutdown> {
    let config = build_config(cli)?;
    debug!(?config, "Configuration loaded");

    let target = WatchTarget::new(cli.path.clone());
    let mut handle = Normalizer::from_config(&config.watch).start(
        &target,
        NotifySource::from_config(&config.watch),
        WriterSink::stdout(config.output.format),
    )?;
    info!(path = %handle.target(), "Watching");

    if config.output.ready_line {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        writeln!(out, "{READY_LINE}")?;
        out.flush()?;
    }

    let outcome = wait_for_shutdown(&mut handle).await;

    // The final flush writes to stdout and may block.
    let stopped = tokio::task::spawn_blocking(move || handle.stop()).await?;

    let shutdown = outcome?;
    stopped?;
    Ok(shutdown)
}

/// Waits for SIGINT, SIGTERM, or a fatal watch error.
///
/// Recoverable errors (backend overflow) are logged and watching continues.
async fn wait_for_shutdown(handle: &mut WatchHandle) -> color_eyre::Result<Shutdown> {
    let interrupt = tokio::signal::ctrl_c();
    let terminate = terminate_signal();
    tokio::pin!(interrupt, terminate);

    loop {
        tokio::select! {
            result = &mut interrupt => {
                result?;
                info!("Received SIGINT, shutting down");
                return Ok(Shutdown::Interrupted);
            }
            result = &mut terminate => {
                result?;
                info!("Received SIGTERM, shutting down");
                return Ok(Shutdown::Terminated);
            }
            err = handle.next_error() => match err {
                Some(err) if err.is_recoverable() => {
                    warn!(error = %err, "Watch may have missed changes");
                }
                Some(err) => return Err(err.into()),
                None => return Err(WatchError::ChannelClosed.into()),
            },
        }
    }
}

#[cfg(unix)]
async fn terminate_signal() -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate_signal() -> io::Result<()> {
    std::future::pending().await
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Parse CLI arguments; usage errors exit 1, --help and --version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    // 2. Install color-eyre before anything can fail
    if let Err(err) = color_eyre::install() {
        let _ = writeln!(io::stderr(), "failed to install error reporter: {err}");
    }

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Watch until told to stop
    match run(&cli).await {
        Ok(shutdown) => ExitCode::from(shutdown.exit_code()),
        Err(report) => {
            let _ = writeln!(io::stderr(), "Error: {report:?}");
            ExitCode::from(exit_code_for(&report))
        }
    }
}
