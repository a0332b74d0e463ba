use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use dialog_sync::{
    api::{DialogApi, FixtureApi, HttpDialogApi},
    app::AppState,
    config::SyncConfig,
    event::{AppEvent, ConnectionState},
    model::DeepLinkIntent,
    runtime::{JsonlOutbox, LogPresenter, Outbound, RecordingOutbound, RunSummary, SyncEngine},
    source,
};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Client-side dialog state synchronization driven by a JSONL message log.
#[derive(Parser, Debug)]
#[command(name = "dialog-sync", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Backend base URL for dialog list and hierarchy fetches.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the backend.
    #[arg(long, global = true, env = "DIALOG_SYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// JSON fixture served instead of a live backend.
    #[arg(long, global = true, conflicts_with = "api_url")]
    fixture: Option<PathBuf>,

    /// Navigation target, e.g. `q4h/q-1` or `dialog/r1/s1`.
    #[arg(long, global = true)]
    deep_link: Option<String>,

    /// Append outbound control messages to this JSONL file.
    #[arg(long, global = true)]
    outbox: Option<PathBuf>,

    /// Engine config file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a finished message log, then print a summary.
    Replay { file: PathBuf },
    /// Follow a message log until Ctrl-C.
    Watch { file: PathBuf },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_api(cli: &Cli) -> Result<Arc<dyn DialogApi>> {
    match (&cli.fixture, &cli.api_url) {
        (Some(path), _) => {
            let fixture = FixtureApi::load(path).wrap_err("loading fixture")?;
            info!(path = %path.display(), roots = fixture.roots.len(), "serving fixture");
            Ok(Arc::new(fixture))
        }
        (None, Some(url)) => Ok(Arc::new(HttpDialogApi::new(url, cli.token.clone()))),
        (None, None) => Err(eyre!("either --api-url or --fixture is required")),
    }
}

fn print_summary(state: &AppState, summary: &RunSummary) {
    let counts = state.counts();
    println!("messages:    {} ({} malformed)", summary.messages, summary.malformed);
    println!("fetches:     {}", summary.fetches);
    println!(
        "dialogs:     {} ({} roots)",
        state.registry.len(),
        state.registry.roots().count()
    );
    println!(
        "q4h:         {} visible / {} held",
        state.q4h_question_count(),
        state.q4h.held_len()
    );
    println!("stoppable:   {}", counts.stoppable);
    println!("resumable:   {}", counts.resumable);
    if let Some(dialog) = &state.main.dialog {
        println!(
            "selected:    {} (course {})",
            dialog,
            state
                .main
                .current_course
                .map_or_else(|| "-".to_string(), |c| c.to_string())
        );
    }
    for toast in &state.toasts {
        println!("toast:       [{:?}] {}", toast.kind, toast.message);
    }
}

async fn run<O: Outbound>(cli: &Cli, file: &Path, follow: bool, outbound: O) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SyncConfig::load(path).wrap_err("loading config")?,
        None => SyncConfig::default(),
    };
    let intent = cli
        .deep_link
        .as_deref()
        .map(str::parse::<DeepLinkIntent>)
        .transpose()
        .wrap_err("parsing --deep-link")?;

    let api = build_api(cli)?;
    let inbound = if follow {
        source::tail(file)?
    } else {
        source::replay(file).await?
    };

    let mut engine = SyncEngine::new(AppState::with_config(config), api, outbound, LogPresenter);
    if let Some(intent) = intent {
        engine.dispatch(AppEvent::DeepLink(intent))?;
    }

    let (_connection_tx, connection_rx) = watch::channel(ConnectionState::Connected);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if follow {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });
    }

    info!(file = %file.display(), follow, "dialog-sync starting");
    let summary = engine.run(inbound, connection_rx, shutdown_rx).await?;
    print_summary(engine.state(), &summary);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (file, follow) = match &cli.command {
        Command::Replay { file } => (file.clone(), false),
        Command::Watch { file } => (file.clone(), true),
    };

    match &cli.outbox {
        Some(path) => run(&cli, &file, follow, JsonlOutbox::create(path)?).await,
        None => run(&cli, &file, follow, RecordingOutbound::default()).await,
    }
}
