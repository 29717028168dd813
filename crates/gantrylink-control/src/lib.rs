//! Control loops for the gantry.
//!
//! Two independent loops share a transport and two single-slot values:
//! - [`CommandPublisher`] samples [`CommandInputs`] every tick and sends a
//!   command frame while the bridge is running.
//! - [`TelemetryIngest`] filters inbound frames for gantry telemetry and
//!   overwrites the latest snapshot.
//!
//! Both loops recover from every transport failure on their own and stop
//! only when their [`CancellationToken`](tokio_util::sync::CancellationToken)
//! is cancelled.

pub mod config;
pub mod error;
pub mod ingest;
pub mod publisher;
pub mod shared;

mod pacing;
#[cfg(test)]
mod testing;

pub use config::LoopConfig;
pub use error::{ControlError, Result};
pub use ingest::{
    ingest_frame, IngestCounters, IngestOutcome, IngestState, IngestTotals, TelemetryIngest,
};
pub use publisher::{CommandPublisher, PublisherState, PublisherStatus};
pub use shared::{
    CommandInputs, CommandSlot, Latest, ReadyGate, TelemetrySlot, AUTONOMOUS_STATE_REQUEST,
};
pub use tokio_util::sync::CancellationToken;
