//! Serial worker thread that owns the media context.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, instrument, warn, Dispatch};

use recorder_ipc::Command;

use crate::config::RecorderConfig;
use crate::context::{EventSink, MediaContext};
use crate::media::{MediaEngine, OutputSignal, SignalSink};

/// Upper bound the dispatcher waits for the worker at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Message delivered to the worker thread.
#[derive(Debug)]
pub enum WorkerMessage {
    Command(Command),
    Signal(OutputSignal),
    Shutdown,
}

impl SignalSink for Sender<WorkerMessage> {
    fn post(&self, signal: OutputSignal) {
        if self.send(WorkerMessage::Signal(signal)).is_err() {
            debug!("Worker gone, signal dropped");
        }
    }
}

struct Worker {
    context: MediaContext,
    rx: Receiver<WorkerMessage>,
    stats_interval: Option<Duration>,
}

impl Worker {
    #[instrument(name = "media_worker", skip(self))]
    fn run(&mut self) {
        info!("Media worker started");
        let mut next_stats = self.stats_interval.map(|every| Instant::now() + every);

        loop {
            let message = match next_stats {
                Some(deadline) => self
                    .rx
                    .recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match message {
                Ok(WorkerMessage::Command(command)) => {
                    debug!(kind = ?command.kind(), "Running command");
                    self.context.execute(command);
                }
                Ok(WorkerMessage::Signal(signal)) => self.context.handle_signal(signal),
                Ok(WorkerMessage::Shutdown) => {
                    info!("Shutdown requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.context.log_stream_stats();
                    next_stats = self.stats_interval.map(|every| Instant::now() + every);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Worker channel disconnected, stopping");
                    break;
                }
            }
        }

        info!("Media worker stopped");
    }
}

/// Owning side of the worker thread.
pub struct WorkerHandle {
    tx: Sender<WorkerMessage>,
    done_rx: Receiver<RecorderConfig>,
    thread: Option<JoinHandle<()>>,
    final_config: Option<RecorderConfig>,
}

impl WorkerHandle {
    /// Start the worker. The media context is built on the worker thread and
    /// logs through `dispatch`.
    pub fn spawn(
        engine: Arc<dyn MediaEngine>,
        config: RecorderConfig,
        events: Box<dyn EventSink>,
        dispatch: Dispatch,
    ) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<RecorderConfig>(1);
        let signals: Arc<dyn SignalSink> = Arc::new(tx.clone());

        let stats_interval = match config.general.stats_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let thread = thread::Builder::new()
            .name("media-worker".into())
            .spawn(move || {
                let config = tracing::dispatcher::with_default(&dispatch, || {
                    let context = MediaContext::new(engine, config, events, signals);
                    let mut worker = Worker {
                        context,
                        rx,
                        stats_interval,
                    };
                    worker.run();
                    let config = worker.context.config().clone();
                    // Releases every engine object before reporting completion.
                    drop(worker);
                    config
                });
                let _ = done_tx.send(config);
            })?;

        Ok(Self {
            tx,
            done_rx,
            thread: Some(thread),
            final_config: None,
        })
    }

    /// Queue a command. Returns false if the worker has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(WorkerMessage::Command(command)).is_ok()
    }

    /// Ask the worker to stop and wait up to `timeout` for it.
    ///
    /// Returns false if the worker did not finish in time; the thread is then
    /// detached.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let Some(thread) = self.thread.take() else {
            return true;
        };

        let _ = self.tx.send(WorkerMessage::Shutdown);
        match self.done_rx.recv_timeout(timeout) {
            Ok(config) => {
                self.final_config = Some(config);
                if thread.join().is_err() {
                    error!("Media worker panicked");
                }
                info!("Media worker joined");
                true
            }
            Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    error!("Media worker panicked");
                }
                info!("Media worker joined");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "Media worker did not stop in time");
                false
            }
        }
    }
}

impl WorkerHandle {
    /// Configuration the worker ended with, after a completed shutdown.
    pub fn take_config(&mut self) -> Option<RecorderConfig> {
        self.final_config.take()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown(SHUTDOWN_TIMEOUT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::EncoderPreference;
    use crate::sim::SimEngine;
    use recorder_ipc::Event;

    fn spawn(sim: &Arc<SimEngine>) -> (WorkerHandle, Receiver<Event>) {
        spawn_with(sim, RecorderConfig::default())
    }

    fn spawn_with(sim: &Arc<SimEngine>, config: RecorderConfig) -> (WorkerHandle, Receiver<Event>) {
        let engine: Arc<dyn MediaEngine> = sim.clone();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();
        let worker = WorkerHandle::spawn(
            engine,
            config,
            Box::new(event_tx),
            Dispatch::none(),
        )
        .unwrap();
        (worker, event_rx)
    }

    fn next(events: &Receiver<Event>) -> Event {
        events.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_commands_run_in_order() {
        let sim = Arc::new(SimEngine::new());
        let (mut worker, events) = spawn(&sim);

        assert!(worker.send(Command::Init));
        assert!(worker.send(Command::StartRecording {
            path: "out.mp4".into()
        }));
        assert!(worker.send(Command::StopRecording { force: false }));

        assert_eq!(next(&events), Event::Inited);
        assert_eq!(next(&events), Event::RecordingStarted);
        assert_eq!(next(&events), Event::RecordingStopping);
        assert_eq!(
            next(&events),
            Event::RecordingStopped {
                path: "out.mp4".into()
            }
        );

        assert!(worker.shutdown(SHUTDOWN_TIMEOUT));
    }

    #[test]
    fn test_shutdown_releases_objects() {
        let sim = Arc::new(SimEngine::new());
        let (mut worker, events) = spawn(&sim);

        worker.send(Command::Init);
        assert_eq!(next(&events), Event::Inited);
        assert!(sim.object_named("Scene").is_some());

        assert!(worker.shutdown(SHUTDOWN_TIMEOUT));
        assert!(sim.object_named("Scene").is_none());
        assert!(sim.object_named("streaming_output").is_none());
        assert!(!worker.send(Command::Init));
    }

    #[test]
    fn test_shutdown_returns_effective_config() {
        let sim = Arc::new(SimEngine::new());
        let mut config = RecorderConfig::default();
        config.output.stream_encoder = EncoderPreference::Nvenc;
        let (mut worker, events) = spawn_with(&sim, config);

        worker.send(Command::Init);
        assert_eq!(next(&events), Event::Inited);
        assert!(worker.take_config().is_none());

        assert!(worker.shutdown(SHUTDOWN_TIMEOUT));
        let config = worker.take_config().unwrap();
        assert_eq!(config.output.stream_encoder, EncoderPreference::X264);
    }

    #[test]
    fn test_shutdown_twice() {
        let sim = Arc::new(SimEngine::new());
        let (mut worker, _events) = spawn(&sim);

        assert!(worker.shutdown(SHUTDOWN_TIMEOUT));
        assert!(worker.shutdown(SHUTDOWN_TIMEOUT));
    }
}
