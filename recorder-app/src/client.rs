//! Controller connection: decodes commands, writes events.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{self, Instant, Interval};
use tracing::{debug, error, info, instrument, warn};

use recorder_engine::RecorderConfig;
use recorder_ipc::{decode_commands, encode_event, Command, Event};

use crate::dispatch::Dispatcher;

/// Delay between the termination trigger and process exit.
pub const GRACE_PERIOD: Duration = Duration::from_millis(100);

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How a controller session ended.
#[derive(Debug)]
pub struct Outcome {
    pub termination: Termination,
    /// Configuration the media context ended with, if it could be collected.
    pub config: Option<RecorderConfig>,
}

/// Why the connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The controller sent `Exit`.
    Exit,
    /// The controller closed the channel.
    Disconnected,
    /// Reading or writing the channel failed.
    ChannelError,
}

pub struct Client<S> {
    stream: S,
    dispatcher: Dispatcher,
    events: UnboundedReceiver<Event>,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, dispatcher: Dispatcher, events: UnboundedReceiver<Event>) -> Self {
        Self {
            stream,
            dispatcher,
            events,
        }
    }

    /// Serve the controller until `Exit`, disconnect or a channel error.
    ///
    /// Events produced during the grace period are still written. The worker,
    /// if any, is shut down before returning.
    #[instrument(name = "client", skip_all)]
    pub async fn run(self) -> io::Result<Outcome> {
        let Self {
            stream,
            mut dispatcher,
            mut events,
        } = self;
        let (mut reader, mut writer) = tokio::io::split(stream);

        dispatcher.on_connect()?;
        info!(strategy = ?dispatcher.strategy(), "Controller connected");

        let mut stats = dispatcher
            .stats_interval()
            .map(|every| time::interval_at(Instant::now() + every, every));
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let termination = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        info!("Controller disconnected");
                        break Termination::Disconnected;
                    }
                    Ok(n) => {
                        if dispatch_bytes(&mut dispatcher, &buf[..n]) {
                            info!("Exit requested");
                            break Termination::Exit;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Channel read failed");
                        break Termination::ChannelError;
                    }
                },
                Some(event) = events.recv() => {
                    if let Err(e) = write_event(&mut writer, &event).await {
                        error!(error = %e, "Channel write failed");
                        break Termination::ChannelError;
                    }
                }
                Some(signal) = dispatcher.next_signal() => dispatcher.handle_signal(signal),
                _ = tick(&mut stats) => dispatcher.log_stream_stats(),
            }
        };

        info!(?termination, grace = ?GRACE_PERIOD, "Terminating");
        let deadline = time::sleep(GRACE_PERIOD);
        tokio::pin!(deadline);
        let mut writable = termination != Termination::ChannelError;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                Some(event) = events.recv() => {
                    if writable {
                        if let Err(e) = write_event(&mut writer, &event).await {
                            debug!(error = %e, "Event dropped during shutdown");
                            writable = false;
                        }
                    }
                }
                Some(signal) = dispatcher.next_signal() => dispatcher.handle_signal(signal),
            }
        }

        let config = dispatcher.shutdown();
        Ok(Outcome {
            termination,
            config,
        })
    }
}

/// Decode and dispatch one read. Returns true when `Exit` was received.
///
/// Commands after `Exit` in the same read are not run, and the channel is
/// not read again during the grace period.
fn dispatch_bytes(dispatcher: &mut Dispatcher, bytes: &[u8]) -> bool {
    let commands = match decode_commands(bytes) {
        Ok(commands) => commands,
        Err(e) => {
            warn!(error = %e, len = bytes.len(), "Dropping undecodable read");
            return false;
        }
    };

    for command in commands {
        log_command(&command);
        if command.is_exit() {
            return true;
        }
        dispatcher.dispatch(command);
    }
    false
}

fn log_command(command: &Command) {
    match command {
        Command::StartStreaming { server, key } => {
            info!(kind = ?command.kind(), server, key_len = key.len(), "Command received");
        }
        other => info!(command = ?other, "Command received"),
    }
}

async fn write_event<W>(writer: &mut W, event: &Event) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = match encode_event(event) {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            debug!(?event, "Event has no wire form, not sent");
            return Ok(());
        }
        Err(e) => {
            warn!(?event, error = %e, "Failed to encode event");
            return Ok(());
        }
    };

    writer.write_all(&frame).await?;
    writer.flush().await?;
    debug!(?event, len = frame.len(), "Event sent");
    Ok(())
}

async fn tick(stats: &mut Option<Interval>) {
    match stats {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use recorder_engine::sim::SimEngine;
    use recorder_engine::{MediaEngine, RecorderConfig};
    use recorder_ipc::{decode_events, encode_command, ErrorCode};
    use tokio::io::DuplexStream;
    use tokio::sync::mpsc;
    use tracing::Dispatch;

    use crate::dispatch::Strategy;

    fn client(strategy: Strategy) -> (Client<DuplexStream>, DuplexStream) {
        let engine: Arc<dyn MediaEngine> = Arc::new(SimEngine::new());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(
            strategy,
            engine,
            RecorderConfig::default(),
            event_tx,
            Dispatch::none(),
        );
        let (ours, theirs) = tokio::io::duplex(4096);
        (Client::new(theirs, dispatcher, event_rx), ours)
    }

    async fn send(controller: &mut DuplexStream, commands: &[Command]) {
        let mut bytes = Vec::new();
        for command in commands {
            bytes.extend_from_slice(&encode_command(command).unwrap());
        }
        controller.write_all(&bytes).await.unwrap();
    }

    /// Read until `count` events have arrived.
    async fn expect_events(controller: &mut DuplexStream, count: usize) -> Vec<Event> {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        time::timeout(Duration::from_secs(5), async {
            loop {
                let n = controller.read(&mut buf).await.unwrap();
                assert!(n > 0, "channel closed early");
                received.extend_from_slice(&buf[..n]);
                if let Ok(events) = decode_events(&received) {
                    if events.len() >= count {
                        return events;
                    }
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_init_reports_inited() {
        let (client, mut controller) = client(Strategy::Direct);
        let task = tokio::spawn(client.run());

        send(&mut controller, &[Command::Init]).await;
        assert_eq!(expect_events(&mut controller, 1).await, vec![Event::Inited]);

        send(&mut controller, &[Command::Exit]).await;
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Exit);
    }

    #[tokio::test]
    async fn test_recording_events_over_channel() {
        let (client, mut controller) = client(Strategy::Direct);
        let task = tokio::spawn(client.run());

        send(
            &mut controller,
            &[
                Command::Init,
                Command::StartRecording {
                    path: "out.mp4".into(),
                },
                Command::StopRecording { force: false },
            ],
        )
        .await;

        // RecordingStopping has no wire kind and is not sent.
        assert_eq!(
            expect_events(&mut controller, 3).await,
            vec![
                Event::Inited,
                Event::RecordingStarted,
                Event::RecordingStopped {
                    path: "out.mp4".into()
                }
            ]
        );

        drop(controller);
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Disconnected);
    }

    #[tokio::test]
    async fn test_worker_strategy() {
        let (client, mut controller) = client(Strategy::Worker);
        let task = tokio::spawn(client.run());

        send(&mut controller, &[Command::Init]).await;
        assert_eq!(expect_events(&mut controller, 1).await, vec![Event::Inited]);

        send(&mut controller, &[Command::Exit]).await;
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Exit);
    }

    #[tokio::test]
    async fn test_invalid_parameter_error_frame() {
        let (client, mut controller) = client(Strategy::Direct);
        let task = tokio::spawn(client.run());

        send(
            &mut controller,
            &[
                Command::Init,
                Command::StartStreaming {
                    server: "rtmp://a".into(),
                    key: String::new(),
                },
                Command::StartStreaming {
                    server: String::new(),
                    key: "key".into(),
                },
            ],
        )
        .await;

        let invalid = Event::error(ErrorCode::ClientStreaming, "invalid parameter");
        let events = expect_events(&mut controller, 3).await;
        assert_eq!(events[1..], [invalid.clone(), invalid]);

        drop(controller);
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Disconnected);
    }

    #[tokio::test]
    async fn test_commands_after_exit_not_run() {
        let (client, mut controller) = client(Strategy::Direct);
        let task = tokio::spawn(client.run());

        send(&mut controller, &[Command::Exit, Command::Init]).await;
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Exit);

        let mut rest = Vec::new();
        controller.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_short_read_ignored() {
        let (client, mut controller) = client(Strategy::Direct);
        let task = tokio::spawn(client.run());

        controller.write_all(&[0x01]).await.unwrap();
        time::sleep(Duration::from_millis(20)).await;
        send(&mut controller, &[Command::Init]).await;
        assert_eq!(expect_events(&mut controller, 1).await, vec![Event::Inited]);

        drop(controller);
        assert_eq!(task.await.unwrap().unwrap().termination, Termination::Disconnected);
    }
}
