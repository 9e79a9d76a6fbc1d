//! fluxmc CLI
//!
//! Usage: fluxmc [OPTIONS] <COMMAND>
//!
//! Commands:
//!   bootstrap  Push control-plane manifests and print the Flux source for them

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fluxmc::config::{load_config_or_default, Config};
use fluxmc::gitops::{GitAuthType, GitRepositorySource};
use fluxmc::FluxmcError;

const USERNAME_ENV: &str = "FLUXMC_GIT_USERNAME";
const PASSWORD_ENV: &str = "FLUXMC_GIT_PASSWORD";

/// fluxmc - multi-cluster GitOps on top of Flux
#[derive(Parser, Debug)]
#[command(name = "fluxmc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/fluxmc/config.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install Flux and management cluster components
    Bootstrap {
        /// The repository URL to push control-plane manifests to
        #[arg(long)]
        repository: Option<String>,

        /// Branch the manifests are pushed to
        #[arg(long)]
        branch: Option<String>,

        /// Shallow clone depth (0 for full history)
        #[arg(long)]
        depth: Option<u32>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure_skip_tls: bool,

        /// Format of the printed GitRepository source
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fluxmc(#[from] FluxmcError),

    #[error("could not render source manifest: {0}")]
    RenderYaml(#[from] serde_yaml::Error),

    #[error("could not render source manifest: {0}")]
    RenderJson(#[from] serde_json::Error),
}

impl CliError {
    fn is_cancelled(&self) -> bool {
        matches!(self, CliError::Fluxmc(e) if e.is_cancelled())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    match run(cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_cancelled() => {
            eprintln!("error: interrupted");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    let mut config = load_config_or_default(cli.config.as_deref()).map_err(FluxmcError::from)?;

    match cli.command {
        Commands::Bootstrap {
            repository,
            branch,
            depth,
            insecure_skip_tls,
            output,
        } => {
            if let Some(repository) = repository {
                config.git.repository = repository;
            }
            if let Some(branch) = branch {
                config.publish.branch = branch;
            }
            if let Some(depth) = depth {
                config.git.depth = depth;
            }
            config.git.insecure_skip_tls |= insecure_skip_tls;
            apply_env_credentials(&mut config);

            let outcome = fluxmc::bootstrap(&config, cancel).await?;
            tracing::info!(
                files = outcome.report.files.len(),
                "control-plane manifests pushed"
            );

            print!("{}", render_source(&outcome.source, output)?);
            Ok(())
        }
    }
}

/// Switches to basic auth when `FLUXMC_GIT_USERNAME` is set and the config
/// names no credential. The password is read from `FLUXMC_GIT_PASSWORD` at use.
fn apply_env_credentials(config: &mut Config) {
    let auth = &mut config.git.auth;
    if auth.auth_type != GitAuthType::None {
        return;
    }
    if let Ok(username) = std::env::var(USERNAME_ENV) {
        if !username.is_empty() {
            tracing::debug!("using basic auth from {}", USERNAME_ENV);
            auth.auth_type = GitAuthType::Basic;
            auth.username = username;
            auth.password_env_var = PASSWORD_ENV.to_string();
        }
    }
}

fn render_source(source: &GitRepositorySource, format: OutputFormat) -> Result<String, CliError> {
    Ok(match format {
        OutputFormat::Yaml => serde_yaml::to_string(source)?,
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(source)?;
            json.push('\n');
            json
        }
    })
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)));

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("warning: could not forward log records: {}", e);
    }
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: could not install log subscriber: {}", e);
    }
}
