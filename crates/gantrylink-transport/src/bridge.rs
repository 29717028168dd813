use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gantrylink_frame::{RawCanFrame, MAX_CAN_PAYLOAD};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::codec::BridgeCodec;
use crate::error::{Result, TransportError};
use crate::state::ServiceState;
use crate::traits::{CanbusTransport, FrameSink, RawFrameStream};

/// Configuration for the TCP bridge client.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge host name or IP address.
    pub address: String,
    /// Bridge TCP port.
    pub port: u16,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Largest payload accepted in either direction.
    pub max_payload: usize,
}

impl BridgeConfig {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string used for connecting.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: "localhost".to_string(),
            port: 6001,
            connect_timeout: Duration::from_secs(1),
            max_payload: MAX_CAN_PAYLOAD,
        }
    }
}

/// TCP client for a CAN-bus bridge service.
///
/// Every stream and every sender is its own connection. The service is
/// reported `Running` while any of those connections is live, or when a
/// trial connect succeeds; otherwise it is `Unavailable`.
pub struct BridgeClient {
    config: BridgeConfig,
    live: Arc<AtomicUsize>,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    async fn connect(&self) -> Result<Framed<TcpStream, BridgeCodec>> {
        let addr = self.config.endpoint();
        let stream =
            match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
                Err(_) => {
                    return Err(TransportError::ConnectTimeout {
                        addr,
                        timeout: self.config.connect_timeout,
                    })
                }
            };
        stream.set_nodelay(true)?;
        tracing::debug!(endpoint = %addr, "bridge connection opened");
        Ok(Framed::new(
            stream,
            BridgeCodec::new(self.config.max_payload),
        ))
    }
}

#[async_trait]
impl CanbusTransport for BridgeClient {
    async fn get_state(&self) -> ServiceState {
        if self.live.load(Ordering::SeqCst) > 0 {
            return ServiceState::Running;
        }
        match self.connect().await {
            Ok(_) => ServiceState::Running,
            Err(err) => {
                tracing::trace!(error = %err, "bridge trial connect failed");
                ServiceState::Unavailable
            }
        }
    }

    async fn stream_raw(&self) -> Result<Box<dyn RawFrameStream>> {
        let framed = self.connect().await?;
        Ok(Box::new(BridgeStream {
            framed,
            _live: LiveGuard::acquire(&self.live),
        }))
    }

    async fn open_sender(&self) -> Result<Box<dyn FrameSink>> {
        let framed = self.connect().await?;
        Ok(Box::new(BridgeSink {
            framed,
            _live: LiveGuard::acquire(&self.live),
        }))
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct BridgeStream {
    framed: Framed<TcpStream, BridgeCodec>,
    _live: LiveGuard,
}

#[async_trait]
impl RawFrameStream for BridgeStream {
    async fn read(&mut self) -> Result<Option<RawCanFrame>> {
        self.framed.next().await.transpose()
    }
}

struct BridgeSink {
    framed: Framed<TcpStream, BridgeCodec>,
    _live: LiveGuard,
}

#[async_trait]
impl FrameSink for BridgeSink {
    async fn send(&mut self, frame: RawCanFrame) -> Result<()> {
        self.framed.send(frame).await
    }
}
