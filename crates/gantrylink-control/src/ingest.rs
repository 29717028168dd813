use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use gantrylink_frame::{identify, DecodeError, FrameKind, RawCanFrame, TelemetryFrame};
use gantrylink_transport::{CanbusTransport, RawFrameStream};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::LoopConfig;
use crate::error::Result;
use crate::pacing::sleep_or_cancel;
use crate::shared::{CommandSlot, ReadyGate, TelemetrySlot};

/// Link state of the telemetry ingest loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestState {
    #[default]
    Disconnected,
    Streaming,
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Gantry telemetry, decoded and stored.
    Decoded,
    /// Some other arbiter ID.
    Skipped,
    /// Gantry arbiter ID but an undecodable payload.
    Rejected(DecodeError),
}

/// Running totals for the ingest loop.
#[derive(Debug, Default)]
pub struct IngestCounters {
    decoded: AtomicU64,
    skipped: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`IngestCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestTotals {
    pub decoded: u64,
    pub skipped: u64,
    pub rejected: u64,
}

impl IngestCounters {
    pub fn totals(&self) -> IngestTotals {
        IngestTotals {
            decoded: self.decoded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Decoded => &self.decoded,
            IngestOutcome::Skipped => &self.skipped,
            IngestOutcome::Rejected(_) => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Filter one raw frame and, if it is gantry telemetry, overwrite `slot`.
pub fn ingest_frame(
    frame: &RawCanFrame,
    slot: &TelemetrySlot,
    mirror: Option<&CommandSlot>,
) -> IngestOutcome {
    if !identify(frame.id, FrameKind::Telemetry) {
        tracing::trace!(arbiter_id = frame.id, "skipping frame for another node");
        return IngestOutcome::Skipped;
    }

    match TelemetryFrame::from_raw(frame) {
        Ok(telemetry) => {
            tracing::trace!(%telemetry, "telemetry decoded");
            if let Some(commands) = mirror {
                commands.update(|inputs| inputs.follow(&telemetry));
            }
            slot.store(Some(telemetry));
            IngestOutcome::Decoded
        }
        Err(err) => {
            tracing::warn!(arbiter_id = frame.id, error = %err, "discarding undecodable telemetry");
            IngestOutcome::Rejected(err)
        }
    }
}

/// Loop that keeps the latest telemetry snapshot current.
pub struct TelemetryIngest {
    transport: Arc<dyn CanbusTransport>,
    telemetry: TelemetrySlot,
    mirror: Option<CommandSlot>,
    config: LoopConfig,
    ready: ReadyGate,
    counters: Arc<IngestCounters>,
    state: watch::Sender<IngestState>,
}

impl TelemetryIngest {
    pub fn new(
        transport: Arc<dyn CanbusTransport>,
        telemetry: TelemetrySlot,
        config: LoopConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(IngestState::Disconnected);
        Ok(Self {
            transport,
            telemetry,
            mirror: None,
            config,
            ready: ReadyGate::open(),
            counters: Arc::new(IngestCounters::default()),
            state,
        })
    }

    /// Also mirror each decoded snapshot into the command inputs.
    pub fn mirror_into(mut self, commands: CommandSlot) -> Self {
        self.mirror = Some(commands);
        self
    }

    pub fn with_ready_gate(mut self, gate: ReadyGate) -> Self {
        self.ready = gate;
        self
    }

    pub fn counters(&self) -> Arc<IngestCounters> {
        self.counters.clone()
    }

    pub fn state(&self) -> watch::Receiver<IngestState> {
        self.state.subscribe()
    }

    /// Run until `cancel` fires. Stream failures never end the loop.
    pub async fn run(self, cancel: CancellationToken) {
        if !self.ready.wait(&cancel).await {
            return;
        }

        let mut stream: Option<Box<dyn RawFrameStream>> = None;
        let mut waiting_logged = false;

        loop {
            let service = tokio::select! {
                state = self.transport.get_state() => state,
                _ = cancel.cancelled() => break,
            };

            if !service.is_ready() {
                if stream.take().is_some() {
                    tracing::info!(state = %service, "canbus service not streaming, releasing telemetry stream");
                    self.state.send_replace(IngestState::Disconnected);
                } else if !waiting_logged {
                    tracing::info!(state = %service, "canbus service is not streaming or ready to stream");
                }
                waiting_logged = true;
                if !sleep_or_cancel(self.config.backoff, &cancel).await {
                    break;
                }
                continue;
            }

            if stream.is_none() {
                let opened = tokio::select! {
                    opened = self.transport.stream_raw() => opened,
                    _ = cancel.cancelled() => break,
                };
                match opened {
                    Ok(opened) => {
                        tracing::info!("telemetry stream opened");
                        waiting_logged = false;
                        stream = Some(opened);
                        self.state.send_replace(IngestState::Streaming);
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to open telemetry stream");
                        if !sleep_or_cancel(self.config.backoff, &cancel).await {
                            break;
                        }
                        continue;
                    }
                }
            }
            let Some(active) = stream.as_mut() else {
                continue;
            };

            let read = tokio::select! {
                read = active.read() => read,
                _ = cancel.cancelled() => break,
            };

            match read {
                Ok(Some(frame)) => {
                    let outcome = ingest_frame(&frame, &self.telemetry, self.mirror.as_ref());
                    self.counters.record(&outcome);
                }
                Ok(None) => {
                    tracing::warn!("telemetry stream ended");
                    self.reset(&mut stream);
                    if !sleep_or_cancel(self.config.backoff, &cancel).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "telemetry stream read failed");
                    self.reset(&mut stream);
                    if !sleep_or_cancel(self.config.backoff, &cancel).await {
                        break;
                    }
                }
            }
        }

        drop(stream);
        self.state.send_replace(IngestState::Disconnected);
        tracing::info!("telemetry ingest stopped");
    }

    fn reset(&self, stream: &mut Option<Box<dyn RawFrameStream>>) {
        *stream = None;
        self.state.send_replace(IngestState::Disconnected);
    }
}
