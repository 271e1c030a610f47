//! Command dispatch strategies.
//!
//! [`Dispatcher::Direct`] runs commands on the channel thread and pulls
//! engine signals from a tokio queue. [`Dispatcher::Worker`] forwards
//! commands to a [`WorkerHandle`] started when the controller connects.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn, Dispatch};

use recorder_engine::{
    spawn_worker, MediaContext, MediaEngine, OutputSignal, RecorderConfig, WorkerHandle,
    SHUTDOWN_TIMEOUT,
};
use recorder_ipc::{Command, Event};

/// Where commands execute. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Worker,
}

impl Strategy {
    pub fn select(threaded_worker: bool, force_direct: bool) -> Self {
        if threaded_worker && !force_direct {
            Self::Worker
        } else {
            Self::Direct
        }
    }
}

pub struct DirectDispatcher {
    context: MediaContext,
    signals: UnboundedReceiver<OutputSignal>,
    stats_interval: Option<Duration>,
}

struct WorkerParts {
    engine: Arc<dyn MediaEngine>,
    config: RecorderConfig,
    events: UnboundedSender<Event>,
    dispatch: Dispatch,
}

pub struct WorkerDispatcher {
    pending: Option<WorkerParts>,
    worker: Option<WorkerHandle>,
}

pub enum Dispatcher {
    Direct(DirectDispatcher),
    Worker(WorkerDispatcher),
}

impl Dispatcher {
    pub fn new(
        strategy: Strategy,
        engine: Arc<dyn MediaEngine>,
        config: RecorderConfig,
        events: UnboundedSender<Event>,
        dispatch: Dispatch,
    ) -> Self {
        match strategy {
            Strategy::Direct => {
                let stats_interval = match config.general.stats_interval_secs {
                    0 => None,
                    secs => Some(Duration::from_secs(secs)),
                };
                let (signal_tx, signals) = mpsc::unbounded_channel::<OutputSignal>();
                let context =
                    MediaContext::new(engine, config, Box::new(events), Arc::new(signal_tx));
                Self::Direct(DirectDispatcher {
                    context,
                    signals,
                    stats_interval,
                })
            }
            Strategy::Worker => Self::Worker(WorkerDispatcher {
                pending: Some(WorkerParts {
                    engine,
                    config,
                    events,
                    dispatch,
                }),
                worker: None,
            }),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Direct(_) => Strategy::Direct,
            Self::Worker(_) => Strategy::Worker,
        }
    }

    /// Called once the controller channel is connected.
    pub fn on_connect(&mut self) -> io::Result<()> {
        let Self::Worker(dispatcher) = self else {
            return Ok(());
        };
        let Some(parts) = dispatcher.pending.take() else {
            return Ok(());
        };

        let worker = spawn_worker(
            parts.engine,
            parts.config,
            Box::new(parts.events),
            parts.dispatch,
        )?;
        info!("Media worker spawned");
        dispatcher.worker = Some(worker);
        Ok(())
    }

    pub fn dispatch(&mut self, command: Command) {
        match self {
            Self::Direct(dispatcher) => dispatcher.context.execute(command),
            Self::Worker(dispatcher) => match &dispatcher.worker {
                Some(worker) => {
                    if !worker.send(command) {
                        warn!("Media worker stopped, command dropped");
                    }
                }
                None => warn!(?command, "Media worker not started, command dropped"),
            },
        }
    }

    /// Next engine signal for a direct context. Never resolves for a worker,
    /// which receives signals on its own queue.
    pub async fn next_signal(&mut self) -> Option<OutputSignal> {
        match self {
            Self::Direct(dispatcher) => dispatcher.signals.recv().await,
            Self::Worker(_) => std::future::pending().await,
        }
    }

    pub fn handle_signal(&mut self, signal: OutputSignal) {
        if let Self::Direct(dispatcher) = self {
            dispatcher.context.handle_signal(signal);
        }
    }

    /// Interval for periodic stream statistics on the channel thread.
    pub fn stats_interval(&self) -> Option<Duration> {
        match self {
            Self::Direct(dispatcher) => dispatcher.stats_interval,
            Self::Worker(_) => None,
        }
    }

    pub fn log_stream_stats(&mut self) {
        if let Self::Direct(dispatcher) = self {
            dispatcher.context.log_stream_stats();
        }
    }

    /// Stop the worker, waiting a bounded time for it.
    ///
    /// Returns the configuration the media context ended with, which carries
    /// encoder fallbacks applied during init. `None` if the worker never
    /// started or did not stop in time.
    pub fn shutdown(&mut self) -> Option<RecorderConfig> {
        let config = match self {
            Self::Direct(dispatcher) => Some(dispatcher.context.config().clone()),
            Self::Worker(dispatcher) => dispatcher.worker.take().and_then(|mut worker| {
                if !worker.shutdown(SHUTDOWN_TIMEOUT) {
                    warn!("Media worker still running at exit");
                }
                worker.take_config()
            }),
        };
        debug!("Dispatcher shut down");
        config
    }
}
