use std::fmt;
use std::sync::Arc;

use gantrylink_frame::{CommandFrame, ControlState};
use gantrylink_transport::{CanbusTransport, FrameSink};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::LoopConfig;
use crate::error::Result;
use crate::pacing::sleep_or_cancel;
use crate::shared::{CommandSlot, ReadyGate, TelemetrySlot};

/// Link state of the command publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherState {
    /// No sender handle; nothing is being sent.
    #[default]
    Idle,
    /// A sender handle is open and frames go out every tick.
    Streaming,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// Published after every state change and every successful send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStatus {
    pub state: PublisherState,
    pub frames_sent: u64,
    pub send_failures: u64,
}

/// Fixed-period command loop.
///
/// Each tick samples the latest [`CommandInputs`](crate::CommandInputs),
/// builds a command frame requesting `AUTO_ACTIVE`, and submits it. The sleep
/// happens after the send completes, so a slow transport stretches the period
/// instead of overlapping sends. A send that outlasts
/// [`LoopConfig::send_timeout`] is treated as a failed send.
pub struct CommandPublisher {
    transport: Arc<dyn CanbusTransport>,
    inputs: CommandSlot,
    telemetry: TelemetrySlot,
    config: LoopConfig,
    ready: ReadyGate,
    status: watch::Sender<PublisherStatus>,
}

impl CommandPublisher {
    pub fn new(
        transport: Arc<dyn CanbusTransport>,
        inputs: CommandSlot,
        telemetry: TelemetrySlot,
        config: LoopConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (status, _) = watch::channel(PublisherStatus::default());
        Ok(Self {
            transport,
            inputs,
            telemetry,
            config,
            ready: ReadyGate::open(),
            status,
        })
    }

    /// Wait on `gate` before the first tick.
    pub fn with_ready_gate(mut self, gate: ReadyGate) -> Self {
        self.ready = gate;
        self
    }

    pub fn status(&self) -> watch::Receiver<PublisherStatus> {
        self.status.subscribe()
    }

    /// Run until `cancel` fires. Transport failures never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        if !self.ready.wait(&cancel).await {
            return;
        }

        let mut sink: Option<Box<dyn FrameSink>> = None;
        let mut waiting_logged = false;
        let mut last_device_state: Option<ControlState> = None;

        loop {
            let state = tokio::select! {
                state = self.transport.get_state() => state,
                _ = cancel.cancelled() => break,
            };

            if !state.is_running() {
                if sink.take().is_some() {
                    tracing::info!(%state, "canbus service not running, releasing command stream");
                    self.set_state(PublisherState::Idle);
                } else if !waiting_logged {
                    tracing::info!(%state, "waiting for running canbus service");
                }
                waiting_logged = true;
                if !sleep_or_cancel(self.config.backoff, &cancel).await {
                    break;
                }
                continue;
            }

            if sink.is_none() {
                let opened = tokio::select! {
                    opened = self.transport.open_sender() => opened,
                    _ = cancel.cancelled() => break,
                };
                match opened {
                    Ok(opened) => {
                        tracing::info!("start sending command frames");
                        waiting_logged = false;
                        sink = Some(opened);
                        self.set_state(PublisherState::Streaming);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to open command stream");
                        if !sleep_or_cancel(self.config.backoff, &cancel).await {
                            break;
                        }
                        continue;
                    }
                }
            }
            let Some(active) = sink.as_mut() else {
                continue;
            };

            self.observe_device(&mut last_device_state);
            let frame = self.build_frame();
            let raw = match frame.to_raw() {
                Ok(raw) => raw,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unencodable command");
                    if !sleep_or_cancel(self.config.period, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            // A send cut short by cancellation or the timeout drops the whole
            // handle, so the peer never sees a partial frame followed by more.
            let sent = tokio::select! {
                sent = tokio::time::timeout(self.config.send_timeout, active.send(raw)) => sent,
                _ = cancel.cancelled() => break,
            };

            let failure = match sent {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(_) => Some(format!(
                    "send did not complete within {:?}",
                    self.config.send_timeout
                )),
            };
            if let Some(error) = failure {
                tracing::warn!(%error, "command send failed, releasing command stream");
                sink = None;
                self.status.send_modify(|status| {
                    status.state = PublisherState::Idle;
                    status.send_failures += 1;
                });
                if !sleep_or_cancel(self.config.backoff, &cancel).await {
                    break;
                }
                continue;
            }
            tracing::trace!(%frame, "command frame sent");
            self.status.send_modify(|status| status.frames_sent += 1);

            if !sleep_or_cancel(self.config.period, &cancel).await {
                break;
            }
        }

        drop(sink);
        self.set_state(PublisherState::Idle);
        tracing::info!("command publisher stopped");
    }

    fn build_frame(&self) -> CommandFrame {
        let inputs = self.inputs.load();
        if !inputs.fits_wire() {
            tracing::warn!(
                feed = inputs.feed,
                x = inputs.x,
                y = inputs.y,
                pto_bits = inputs.pto_bits,
                "command inputs out of wire range, clamping"
            );
        }
        inputs.to_frame()
    }

    fn observe_device(&self, last: &mut Option<ControlState>) {
        let Some(state) = self.telemetry.load().map(|t| t.state) else {
            return;
        };
        if *last == Some(state) {
            return;
        }
        match state {
            ControlState::Alarm | ControlState::Estopped => {
                tracing::warn!(device_state = %state, "gantry reports a fault state while commanding AUTO_ACTIVE");
            }
            _ => tracing::info!(device_state = %state, "gantry state changed"),
        }
        *last = Some(state);
    }

    fn set_state(&self, state: PublisherState) {
        self.status.send_if_modified(|status| {
            if status.state == state {
                return false;
            }
            status.state = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gantrylink_frame::{TelemetryFrame, PAYLOAD_SIZE};
    use gantrylink_transport::{MemoryBus, ServiceState};

    use super::*;
    use crate::shared::CommandInputs;
    use crate::testing::StubTransport;

    fn fast_config() -> LoopConfig {
        LoopConfig {
            period: Duration::from_millis(2),
            backoff: Duration::from_millis(5),
            ..LoopConfig::default()
        }
    }

    fn publisher_on(bus: &MemoryBus, inputs: CommandSlot) -> CommandPublisher {
        CommandPublisher::new(
            Arc::new(bus.clone()),
            inputs,
            TelemetrySlot::default(),
            fast_config(),
        )
        .expect("config should be valid")
    }

    async fn wait_status(
        rx: &mut watch::Receiver<PublisherStatus>,
        pred: impl FnMut(&PublisherStatus) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
            .await
            .expect("status should change in time")
            .expect("publisher should still be alive");
    }

    #[tokio::test]
    async fn follows_transport_availability() {
        let bus = MemoryBus::new(ServiceState::Unavailable);
        let publisher = publisher_on(&bus, CommandSlot::default());
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(status.borrow().state, PublisherState::Idle);
        assert_eq!(bus.frames_sent(), 0);
        assert_eq!(bus.open_sinks(), 0);

        bus.set_state(ServiceState::Running);
        wait_status(&mut status, |s| {
            s.state == PublisherState::Streaming && s.frames_sent >= 3
        })
        .await;
        assert_eq!(bus.open_sinks(), 1);

        bus.set_state(ServiceState::Unavailable);
        wait_status(&mut status, |s| s.state == PublisherState::Idle).await;
        let sent = bus.frames_sent();
        assert_eq!(bus.open_sinks(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(bus.frames_sent(), sent, "no frames while idle");

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
    }

    #[tokio::test]
    async fn idle_service_state_does_not_stream() {
        let bus = MemoryBus::new(ServiceState::Idle);
        let publisher = publisher_on(&bus, CommandSlot::default());
        let status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(status.borrow().state, PublisherState::Idle);
        assert_eq!(bus.frames_sent(), 0);

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
    }

    #[tokio::test]
    async fn sends_latest_inputs_with_clamping() {
        let bus = MemoryBus::new(ServiceState::Running);
        let mut sent = bus.subscribe_sent();
        let inputs = CommandSlot::default();
        inputs.store(CommandInputs {
            feed: 40_000,
            x: 50,
            y: -50,
            ..CommandInputs::default()
        });
        let publisher = publisher_on(&bus, inputs.clone());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        let raw = sent.recv().await.expect("a frame should be sent");
        assert_eq!(raw.id, 0x212);
        assert_eq!(raw.data.len(), PAYLOAD_SIZE);
        let frame = CommandFrame::decode(&raw.data).expect("payload should decode");
        assert_eq!(frame.state_request, ControlState::AutoActive);
        assert_eq!(frame.feed, i16::MAX);
        assert_eq!((frame.x, frame.y), (50, -50));

        inputs.update(|i| i.x = 75);
        let updated = loop {
            let raw = sent.recv().await.expect("frames keep flowing");
            let frame = CommandFrame::decode(&raw.data).expect("payload should decode");
            if frame.x == 75 {
                break frame;
            }
        };
        assert_eq!(updated.y, -50);

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
    }

    #[tokio::test]
    async fn send_failure_returns_to_idle_and_recovers() {
        let bus = MemoryBus::new(ServiceState::Running);
        let publisher = publisher_on(&bus, CommandSlot::default());
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        wait_status(&mut status, |s| s.frames_sent >= 1).await;
        bus.set_fail_sends(true);
        wait_status(&mut status, |s| {
            s.send_failures >= 1 && s.state == PublisherState::Idle
        })
        .await;

        bus.set_fail_sends(false);
        let before = status.borrow().frames_sent;
        wait_status(&mut status, |s| {
            s.state == PublisherState::Streaming && s.frames_sent > before
        })
        .await;

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
        assert_eq!(bus.open_sinks(), 0);
    }

    #[tokio::test]
    async fn waits_for_ready_gate() {
        let bus = MemoryBus::new(ServiceState::Running);
        let gate = ReadyGate::new();
        let publisher = publisher_on(&bus, CommandSlot::default()).with_ready_gate(gate.clone());
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.frames_sent(), 0);

        gate.mark_ready();
        wait_status(&mut status, |s| s.frames_sent >= 1).await;

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
    }

    #[tokio::test]
    async fn cancellation_releases_sender() {
        let bus = MemoryBus::new(ServiceState::Running);
        let telemetry = TelemetrySlot::default();
        telemetry.store(Some(TelemetryFrame::new(
            ControlState::Estopped,
            0,
            0,
            0,
            true,
            true,
        )));
        let publisher = CommandPublisher::new(
            Arc::new(bus.clone()),
            CommandSlot::default(),
            telemetry,
            fast_config(),
        )
        .expect("config should be valid");
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        wait_status(&mut status, |s| s.state == PublisherState::Streaming).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("publisher should stop promptly")
            .expect("publisher should exit cleanly");
        assert_eq!(bus.open_sinks(), 0);
    }

    fn publisher_over(transport: &StubTransport, config: LoopConfig) -> CommandPublisher {
        CommandPublisher::new(
            Arc::new(transport.clone()),
            CommandSlot::default(),
            TelemetrySlot::default(),
            config,
        )
        .expect("config should be valid")
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stalled_send() {
        let transport = StubTransport::stalled();
        let publisher = publisher_over(&transport, fast_config());
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        wait_status(&mut status, |s| s.state == PublisherState::Streaming).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(status.borrow().frames_sent, 0, "send is still stuck");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("publisher should stop while a send is stuck")
            .expect("publisher should exit cleanly");
        assert_eq!(status.borrow().state, PublisherState::Idle);
    }

    #[tokio::test]
    async fn send_timeout_drops_the_sender() {
        let transport = StubTransport::stalled();
        let config = LoopConfig {
            send_timeout: Duration::from_millis(20),
            ..fast_config()
        };
        let publisher = publisher_over(&transport, config);
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        wait_status(&mut status, |s| s.send_failures >= 2).await;
        assert_eq!(status.borrow().frames_sent, 0);
        assert!(
            transport.senders_opened() >= 2,
            "a timed-out sender is replaced, not reused"
        );

        cancel.cancel();
        task.await.expect("publisher should exit cleanly");
    }

    #[tokio::test]
    async fn slow_sends_stretch_the_period_without_overlapping() {
        let delay = Duration::from_millis(15);
        let transport = StubTransport::slow(delay);
        let config = LoopConfig {
            period: Duration::from_millis(5),
            ..fast_config()
        };
        let publisher = publisher_over(&transport, config);
        let mut status = publisher.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(publisher.run(cancel.clone()));

        wait_status(&mut status, |s| s.frames_sent >= 4).await;
        cancel.cancel();
        task.await.expect("publisher should exit cleanly");

        assert_eq!(transport.sends.max_in_flight(), 1);
        assert_eq!(transport.senders_opened(), 1);
        let starts = transport.sends.starts();
        assert!(starts.len() >= 4);
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= delay + config.period,
                "sends started {gap:?} apart"
            );
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let bus = MemoryBus::new(ServiceState::Running);
        let result = CommandPublisher::new(
            Arc::new(bus),
            CommandSlot::default(),
            TelemetrySlot::default(),
            LoopConfig {
                period: Duration::ZERO,
                ..LoopConfig::default()
            },
        );
        assert!(result.is_err());
    }
}
