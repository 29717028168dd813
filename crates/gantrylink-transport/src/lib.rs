//! CAN-bus bridge transport abstraction.
//!
//! The control loops never talk to a bus directly. They consume the
//! [`CanbusTransport`] trait, which reports the bridge service state and hands
//! out two kinds of handles:
//! - [`RawFrameStream`] for inbound frames
//! - [`FrameSink`] for outbound frames
//!
//! Dropping a handle releases it. Two implementations ship here: an
//! in-process [`MemoryBus`] and a TCP [`BridgeClient`].

pub mod bridge;
pub mod codec;
pub mod error;
pub mod memory;
pub mod state;
pub mod traits;

pub use bridge::{BridgeClient, BridgeConfig};
pub use codec::BridgeCodec;
pub use error::{Result, TransportError};
pub use memory::MemoryBus;
pub use state::ServiceState;
pub use traits::{CanbusTransport, FrameSink, RawFrameStream};
