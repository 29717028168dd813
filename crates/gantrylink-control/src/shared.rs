use std::sync::Arc;

use gantrylink_frame::{CommandFrame, ControlState, TelemetryFrame, PTO_BITS_MAX};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// State requested in every command while the publisher drives the gantry.
pub const AUTONOMOUS_STATE_REQUEST: ControlState = ControlState::AutoActive;

/// Single-slot, last-write-wins value shared across tasks.
///
/// Stores replace the whole value; loads clone it out under the slot's
/// internal lock, so a reader never sees a half-written value.
pub struct Latest<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> Latest<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current value.
    pub fn store(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Modify the current value in place.
    pub fn update(&self, modify: impl FnOnce(&mut T)) {
        self.tx.send_modify(modify);
    }

    /// Copy of the current value.
    pub fn load(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every store.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for Latest<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Latest decoded telemetry, `None` until the first frame arrives.
pub type TelemetrySlot = Latest<Option<TelemetryFrame>>;

/// Latest application-held command values.
pub type CommandSlot = Latest<CommandInputs>;

/// Command values held by the application between ticks.
///
/// Fields are wider than the wire so callers can hand over raw targets
/// (pixel offsets, computed positions); conversion clamps to the wire range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandInputs {
    /// Commanded speed in mm/s.
    pub feed: i32,
    pub x: i32,
    pub y: i32,
    pub relative: bool,
    pub jog: bool,
    pub pto_bits: u8,
}

impl Default for CommandInputs {
    fn default() -> Self {
        Self {
            feed: 1000,
            x: 0,
            y: 0,
            relative: true,
            jog: true,
            pto_bits: 0,
        }
    }
}

impl CommandInputs {
    /// Whether every field fits the wire without clamping.
    pub fn fits_wire(&self) -> bool {
        [self.feed, self.x, self.y]
            .iter()
            .all(|v| i16::try_from(*v).is_ok())
            && self.pto_bits <= PTO_BITS_MAX
    }

    /// Build this tick's command frame, clamping out-of-range values.
    pub fn to_frame(&self) -> CommandFrame {
        CommandFrame::saturating(
            AUTONOMOUS_STATE_REQUEST,
            self.feed,
            self.x,
            self.y,
            self.relative,
            self.jog,
            self.pto_bits,
        )
    }

    /// Mirror measured feed, position, and jog mode into the command values.
    pub fn follow(&mut self, telemetry: &TelemetryFrame) {
        self.feed = i32::from(telemetry.meas_feed);
        self.x = i32::from(telemetry.meas_x);
        self.y = i32::from(telemetry.meas_y);
        self.jog = telemetry.jog;
    }
}

/// Gate the loops wait on until the owning application has initialized.
#[derive(Clone)]
pub struct ReadyGate {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadyGate {
    /// A gate that stays closed until [`ReadyGate::mark_ready`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A gate that is already open.
    pub fn open() -> Self {
        let gate = Self::new();
        gate.mark_ready();
        gate
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until ready. Returns false if cancelled first.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        tokio::select! {
            ready = rx.wait_for(|ready| *ready) => ready.is_ok(),
            _ = cancel.cancelled() => false,
        }
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}
