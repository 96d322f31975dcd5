// Entrypoint for the relay.
// - Parses arguments, sets up logging and resolves configuration
//   (prompting on first run).
// - Hands a fully built `Watcher` control; it only returns on a fatal error.

use anyhow::{ensure, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use potfile_relay::{
    api::ApiClient,
    config::{self, Settings, StateFile},
    offsets::OffsetStore,
    ui,
    watcher::{ThreadSleep, Watcher},
    RelayError,
};

#[derive(Parser, Debug)]
#[command(
    name = "potfile-relay",
    version,
    about = "Repeatedly submits new lines of the given potfile after a set delay."
)]
struct Cli {
    /// Potfile to watch
    potfile: PathBuf,

    /// State file holding the API settings and upload offsets
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Algorithm label sent with every batch (prompted for when omitted)
    #[arg(short, long)]
    algorithm: Option<String>,

    /// Submission endpoint
    #[arg(long, env = "POTFILE_RELAY_ENDPOINT", default_value = config::DEFAULT_ENDPOINT)]
    endpoint: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "potfile_relay=debug"
    } else {
        "potfile_relay=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate the potfile before anything gets written.
    if !cli.potfile.is_file() {
        return Err(RelayError::NotAFile {
            path: cli.potfile.clone(),
        })
        .context("please provide a valid file for your potfile path");
    }

    let state_path = cli.config.unwrap_or_else(config::default_state_path);
    let mut state = StateFile::load(&state_path)
        .with_context(|| format!("failed to load state from {}", state_path.display()))?;
    let api = ui::api_section_or_prompt(&mut state)?;
    ensure!(
        api.resubmission_delay > 0,
        "resubmission_delay in {} must be a positive number of seconds",
        state_path.display()
    );
    state
        .save_atomic(&state_path)
        .context("failed to write state file")?;
    info!(path = %state_path.display(), "config loaded");

    let algorithm = match cli.algorithm {
        Some(algorithm) => algorithm,
        None => ui::prompt_algorithm()?,
    };
    let settings = Settings::new(&api, cli.endpoint, algorithm);

    let client = ApiClient::new(&settings).context("failed to build HTTP client")?;
    info!(endpoint = %client.endpoint(), algorithm = %settings.algorithm, "submitting finds");
    let store = OffsetStore::new(&state_path, state);
    let mut watcher = Watcher::new(&cli.potfile, &settings, store, client, ThreadSleep)
        .context("failed to start watching potfile")?;

    watcher.run().context("watcher stopped")?;
    Ok(())
}
