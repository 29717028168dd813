use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use gantrylink_frame::RawCanFrame;
use tokio::sync::{broadcast, watch};

use crate::error::{Result, TransportError};
use crate::state::ServiceState;
use crate::traits::{CanbusTransport, FrameSink, RawFrameStream};

const DEFAULT_CAPACITY: usize = 256;

/// In-process CAN bus with a scriptable service state.
///
/// Frames passed to [`MemoryBus::inject`] are delivered to every open
/// [`RawFrameStream`]; frames written through a [`FrameSink`] are counted and
/// rebroadcast to [`MemoryBus::subscribe_sent`] receivers.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<ServiceState>,
    inbound: broadcast::Sender<RawCanFrame>,
    outbound: broadcast::Sender<RawCanFrame>,
    frames_sent: AtomicU64,
    open_streams: Arc<AtomicUsize>,
    open_sinks: Arc<AtomicUsize>,
    fail_sends: AtomicBool,
}

impl MemoryBus {
    pub fn new(state: ServiceState) -> Self {
        Self::with_capacity(state, DEFAULT_CAPACITY)
    }

    /// Create a bus whose per-subscriber buffers hold `capacity` frames.
    pub fn with_capacity(state: ServiceState, capacity: usize) -> Self {
        let (state, _) = watch::channel(state);
        let (inbound, _) = broadcast::channel(capacity);
        let (outbound, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                state,
                inbound,
                outbound,
                frames_sent: AtomicU64::new(0),
                open_streams: Arc::new(AtomicUsize::new(0)),
                open_sinks: Arc::new(AtomicUsize::new(0)),
                fail_sends: AtomicBool::new(false),
            }),
        }
    }

    /// Change the reported service state. Open streams end when the state
    /// leaves `Idle`/`Running`.
    pub fn set_state(&self, state: ServiceState) {
        self.inner.state.send_replace(state);
    }

    pub fn state(&self) -> ServiceState {
        *self.inner.state.borrow()
    }

    /// Put a frame on the bus. Returns how many open streams will see it.
    pub fn inject(&self, frame: RawCanFrame) -> usize {
        self.inner.inbound.send(frame).unwrap_or(0)
    }

    /// Observe frames written by senders.
    pub fn subscribe_sent(&self) -> broadcast::Receiver<RawCanFrame> {
        self.inner.outbound.subscribe()
    }

    /// Total frames accepted from senders.
    pub fn frames_sent(&self) -> u64 {
        self.inner.frames_sent.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.inner.open_streams.load(Ordering::SeqCst)
    }

    pub fn open_sinks(&self) -> usize {
        self.inner.open_sinks.load(Ordering::SeqCst)
    }

    /// Make every subsequent send fail with an I/O error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CanbusTransport for MemoryBus {
    async fn get_state(&self) -> ServiceState {
        self.state()
    }

    async fn stream_raw(&self) -> Result<Box<dyn RawFrameStream>> {
        let state = self.state();
        if !state.is_ready() {
            return Err(TransportError::Unavailable(state));
        }
        Ok(Box::new(MemoryStream {
            frames: self.inner.inbound.subscribe(),
            state: self.inner.state.subscribe(),
            _guard: HandleGuard::acquire(&self.inner.open_streams),
        }))
    }

    async fn open_sender(&self) -> Result<Box<dyn FrameSink>> {
        let state = self.state();
        if !state.is_running() {
            return Err(TransportError::Unavailable(state));
        }
        Ok(Box::new(MemorySink {
            bus: self.inner.clone(),
            _guard: HandleGuard::acquire(&self.inner.open_sinks),
        }))
    }
}

struct HandleGuard(Arc<AtomicUsize>);

impl HandleGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct MemoryStream {
    frames: broadcast::Receiver<RawCanFrame>,
    state: watch::Receiver<ServiceState>,
    _guard: HandleGuard,
}

#[async_trait]
impl RawFrameStream for MemoryStream {
    async fn read(&mut self) -> Result<Option<RawCanFrame>> {
        loop {
            if !self.state.borrow_and_update().is_ready() {
                return Ok(None);
            }

            tokio::select! {
                received = self.frames.recv() => match received {
                    Ok(frame) => {
                        return Ok(Some(RawCanFrame {
                            stamp: Instant::now(),
                            ..frame
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "memory stream lagged, dropping oldest frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(None),
                },
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

struct MemorySink {
    bus: Arc<Inner>,
    _guard: HandleGuard,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: RawCanFrame) -> Result<()> {
        let state = *self.bus.state.borrow();
        if !state.is_running() {
            return Err(TransportError::Unavailable(state));
        }
        if self.bus.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "memory bus send failure",
            )));
        }
        self.bus.frames_sent.fetch_add(1, Ordering::SeqCst);
        let _ = self.bus.outbound.send(frame);
        Ok(())
    }
}
