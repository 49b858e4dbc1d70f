//! Weather station driver adapters
//!
//! A driver yields LOOP packets, each in a single declared unit system.
//! [`pump`] moves packets from a driver onto a channel until cancelled so
//! the archive loop never waits on hardware directly.

pub mod driver;
pub mod simulator;

pub use driver::*;
pub use simulator::*;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weex_core::LoopPacket;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Timeout waiting for data")]
    Timeout,

    #[error("Unknown driver {name}, available: {known}")]
    UnknownDriver { name: String, known: String },

    #[error("Invalid driver settings: {0}")]
    Config(String),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Trait for all weather station drivers
#[async_trait::async_trait]
pub trait StationDriver: Send + Sync {
    /// Driver name/identifier
    fn name(&self) -> &str;

    /// Initialize the driver and start data collection
    async fn start(&mut self) -> IngestResult<()>;

    /// Stop the driver and clean up resources
    async fn stop(&mut self) -> IngestResult<()>;

    /// Wait for the next LOOP packet
    async fn get_packet(&mut self) -> IngestResult<LoopPacket>;

    /// Check if driver is currently active
    fn is_active(&self) -> bool;
}

/// Channel-based packet receiver for async communication
pub type PacketReceiver = mpsc::Receiver<LoopPacket>;
pub type PacketSender = mpsc::Sender<LoopPacket>;

/// Create a new packet channel with specified buffer size
pub fn create_packet_channel(buffer_size: usize) -> (PacketSender, PacketReceiver) {
    mpsc::channel(buffer_size)
}

/// Forward packets from `driver` to `sender` until `token` is cancelled,
/// the receiver goes away, or the driver fails. The driver is started
/// here and stopped on the way out.
pub async fn pump(
    mut driver: Box<dyn StationDriver>,
    sender: PacketSender,
    token: CancellationToken,
) -> IngestResult<u64> {
    driver.start().await?;
    let mut forwarded = 0_u64;

    let result = loop {
        let packet = tokio::select! {
            biased;
            _ = token.cancelled() => break Ok(forwarded),
            packet = driver.get_packet() => packet,
        };
        match packet {
            Ok(packet) => {
                let sent = tokio::select! {
                    biased;
                    _ = token.cancelled() => break Ok(forwarded),
                    sent = sender.send(packet) => sent,
                };
                if sent.is_err() {
                    info!("Packet receiver closed, stopping {}", driver.name());
                    break Ok(forwarded);
                }
                forwarded += 1;
            }
            Err(IngestError::Timeout) => {
                warn!("Timed out waiting for a packet from {}", driver.name());
            }
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = driver.stop().await {
        warn!("Failed to stop {}: {}", driver.name(), e);
    }
    result
}
