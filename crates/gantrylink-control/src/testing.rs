//! Scripted transport for loop tests that need a slow or stuck bridge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gantrylink_frame::RawCanFrame;
use gantrylink_transport::{CanbusTransport, FrameSink, RawFrameStream, Result, ServiceState};

/// Always reports `Running`. Inbound streams never open; sender handles
/// take `send_delay` per frame, or never finish when it is `None`.
#[derive(Clone)]
pub(crate) struct StubTransport {
    send_delay: Option<Duration>,
    pub(crate) sends: Arc<SendLog>,
    senders_opened: Arc<AtomicUsize>,
}

impl StubTransport {
    pub(crate) fn stalled() -> Self {
        Self::with_send_delay(None)
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self::with_send_delay(Some(delay))
    }

    fn with_send_delay(send_delay: Option<Duration>) -> Self {
        Self {
            send_delay,
            sends: Arc::new(SendLog::default()),
            senders_opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn senders_opened(&self) -> usize {
        self.senders_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CanbusTransport for StubTransport {
    async fn get_state(&self) -> ServiceState {
        ServiceState::Running
    }

    async fn stream_raw(&self) -> Result<Box<dyn RawFrameStream>> {
        std::future::pending().await
    }

    async fn open_sender(&self) -> Result<Box<dyn FrameSink>> {
        self.senders_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSink {
            delay: self.send_delay,
            sends: self.sends.clone(),
        }))
    }
}

struct StubSink {
    delay: Option<Duration>,
    sends: Arc<SendLog>,
}

#[async_trait]
impl FrameSink for StubSink {
    async fn send(&mut self, _frame: RawCanFrame) -> Result<()> {
        let _guard = self.sends.begin();
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => std::future::pending::<()>().await,
        }
        Ok(())
    }
}

/// When sends started and how many ran at once.
#[derive(Default)]
pub(crate) struct SendLog {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    starts: Mutex<Vec<Instant>>,
}

impl SendLog {
    fn begin(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.starts
            .lock()
            .expect("send log lock")
            .push(Instant::now());
        InFlight(&self.in_flight)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn starts(&self) -> Vec<Instant> {
        self.starts.lock().expect("send log lock").clone()
    }
}

/// Decrements the in-flight count when the send finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
