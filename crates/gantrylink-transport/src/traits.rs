use std::sync::Arc;

use async_trait::async_trait;
use gantrylink_frame::RawCanFrame;

use crate::error::Result;
use crate::state::ServiceState;

/// The CAN-bus bridge as seen by the control loops.
#[async_trait]
pub trait CanbusTransport: Send + Sync {
    /// Current service state. Polled before every send/receive cycle.
    async fn get_state(&self) -> ServiceState;

    /// Open an inbound stream of raw frames.
    async fn stream_raw(&self) -> Result<Box<dyn RawFrameStream>>;

    /// Open an outbound handle that accepts one frame per call.
    async fn open_sender(&self) -> Result<Box<dyn FrameSink>>;
}

/// Inbound frame stream. Dropping it releases the underlying handle.
#[async_trait]
pub trait RawFrameStream: Send {
    /// Next frame, or `Ok(None)` at end of stream.
    async fn read(&mut self) -> Result<Option<RawCanFrame>>;
}

/// Outbound frame handle. Dropping it releases the underlying handle.
#[async_trait]
pub trait FrameSink: Send {
    /// Submit one frame. A frame is either sent whole or not at all.
    async fn send(&mut self, frame: RawCanFrame) -> Result<()>;
}

#[async_trait]
impl<T: CanbusTransport + ?Sized> CanbusTransport for Arc<T> {
    async fn get_state(&self) -> ServiceState {
        (**self).get_state().await
    }

    async fn stream_raw(&self) -> Result<Box<dyn RawFrameStream>> {
        (**self).stream_raw().await
    }

    async fn open_sender(&self) -> Result<Box<dyn FrameSink>> {
        (**self).open_sender().await
    }
}
