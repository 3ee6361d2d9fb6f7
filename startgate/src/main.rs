use clap::{Parser, Subcommand};
use gate::redirects::{resolve_landing, resolve_redirects};
use gate::store::{StoreError, get_state_store};
use gate::{Destination, Gate, Presenter, SetupError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use url::Url;

mod config;
mod observability;

use config::{Config, ConfigError};
use observability::ObservabilityError;

const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "startgate", about = "Resolve where an app launch should go")]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, short, default_value = "startgate.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Resolve the destination for this launch
    Launch,
    /// Follow a URL's redirects and print where it ends up
    Redirects { url: Url },
    /// Follow redirects, then check the landing page for a split destination
    Landing { url: Url },
    /// Clear persisted state, including the cached destination
    Reset,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error("could not clear state: {0}")]
    Store(#[from] StoreError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Prints the destination to stdout.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn on_resolved(&self, destination: Destination) {
        match destination {
            Destination::Remote(url) => println!("{url}"),
            Destination::Local => println!("local"),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("startgate: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = Config::from_file(&cli.config)?;
    let _sentry = observability::init_logging(config.common.logging.as_ref());
    observability::init_metrics(config.common.metrics.as_ref())?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match cli.command {
            CliCommand::Launch => {
                let gate = Gate::from_config(&config.gate)?;
                let outcome = gate.launch(&ConsolePresenter).await;
                tracing::debug!(?outcome, "Launch finished");
                gate.flush_events(EVENT_FLUSH_TIMEOUT).await;
            }
            CliCommand::Redirects { url } => {
                let resolved = resolve_redirects(&url, config.gate.timeouts.redirect()).await;
                println!("{resolved}");
            }
            CliCommand::Landing { url } => {
                let landing = resolve_landing(&url, config.gate.timeouts.redirect()).await;
                println!("{landing}");
            }
            CliCommand::Reset => {
                get_state_store(&config.gate.state_store).clear()?;
                tracing::info!("State cleared");
            }
        }
        Ok::<(), CliError>(())
    })
}
