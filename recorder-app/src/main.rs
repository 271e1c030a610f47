//! Recorder worker process.
//!
//! Connects to the controller's local channel, executes the commands it
//! sends against the media engine and reports events back.

mod channel;
mod cli;
mod client;
mod dispatch;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Dispatch};

use recorder_engine::{MediaEngine, RecorderConfig};
use recorder_ipc::{ErrorCode, Event};

use crate::cli::Cli;
use crate::client::{Client, Outcome, Termination};
use crate::dispatch::{Dispatcher, Strategy};
use crate::logging::Logging;

const CONFIG_FILE: &str = "config.json";

fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = match Logging::init(cli.log.as_deref()) {
        Ok(logging) => logging,
        Err(e) => {
            eprintln!("recorder: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let _default = tracing::dispatcher::set_default(logging.dispatch());

    let span = info_span!(
        "recorder",
        user = cli.user.as_deref().unwrap_or(""),
        id = cli.id.as_deref().unwrap_or("")
    );
    let _enter = span.enter();

    match run(&cli, logging.dispatch()) {
        Ok(termination) => {
            info!(?termination, "Recorder exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Recorder failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, dispatch: &Dispatch) -> Result<Termination> {
    info!(version = env!("CARGO_PKG_VERSION"), server = %cli.server, "Recorder starting");
    if let Some(dir) = &cli.crash {
        debug!(?dir, "Crash capture not available, ignoring crash directory");
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match RecorderConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(code = ?ErrorCode::ClientStartup, error = %e, "Failed to load config");
            return Err(e).with_context(|| format!("Failed to load config: {:?}", config_path));
        }
    };

    let engine = recorder_engine::create_engine();
    let strategy = Strategy::select(config.general.threaded_worker, cli.direct);
    let ducking_changed = config.general.disable_audio_ducking && engine.set_audio_ducking(false);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let result = runtime.block_on(serve(
        &cli.server,
        Arc::clone(&engine),
        config.clone(),
        strategy,
        dispatch.clone(),
    ));

    if ducking_changed {
        engine.set_audio_ducking(true);
    }

    // Encoder fallbacks applied during init are kept for the next run.
    let effective = result
        .as_ref()
        .ok()
        .and_then(|outcome| outcome.config.as_ref())
        .unwrap_or(&config);
    save_config(effective, &config_path);

    result.map(|outcome| outcome.termination)
}

async fn serve(
    server: &str,
    engine: Arc<dyn MediaEngine>,
    config: RecorderConfig,
    strategy: Strategy,
    dispatch: Dispatch,
) -> Result<Outcome> {
    let stream = channel::connect(server)
        .await
        .with_context(|| format!("Failed to connect to controller channel {server:?}"))?;
    info!(?strategy, "Connected to controller");

    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let dispatcher = Dispatcher::new(strategy, engine, config, event_tx, dispatch);
    Client::new(stream, dispatcher, event_rx)
        .run()
        .await
        .context("Failed to start media worker")
}

fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join("data")
        .join(CONFIG_FILE)
}

fn save_config(config: &RecorderConfig, path: &Path) {
    match config.save(path) {
        Ok(()) => debug!(?path, "Config saved"),
        Err(e) => warn!(error = %e, "Failed to save config"),
    }
}
