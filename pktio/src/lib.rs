//! Packet I/O substrate: the `PacketIo` boundary the forwarding core
//! consumes, plus two concrete implementations — a raw `AF_PACKET` kernel
//! driver for real interfaces, and an in-memory substrate for tests.

pub mod kernel;
pub mod test_io;

use router_net::MacAddr;
use thiserror::Error;

/// Numeric interface id, matching spec's `0..=255` interface-id range.
pub type InterfaceId = u8;
/// TX/RX queue index within an interface.
pub type QueueId = u16;
/// An owned Ethernet frame buffer.
pub type Frame = Vec<u8>;

/// Maximum number of frames drained or sent per burst call, matching the
/// worker's burst cap.
pub const MAX_BURST_SIZE: usize = 32;

/// RX/TX descriptor and mempool sizing the dispatcher requests of the
/// substrate at `configure_device` time. AF_PACKET sockets don't need
/// pre-sized descriptor rings, but these stay as named constants to
/// document the DPDK-derived defaults the design assumes.
pub const RX_DESCRIPTORS: u16 = 256;
pub const TX_DESCRIPTORS: u16 = 256;
pub const MEMPOOL_SIZE: u32 = 2047;
pub const MEMPOOL_CACHE_SIZE: u32 = 256;
pub const MBUF_SIZE: u32 = 1600;

#[derive(Debug, Error)]
pub enum PacketIoError {
    #[error("unknown interface id {0}")]
    UnknownInterface(InterfaceId),
    #[error("interface '{0}' has no known MAC address")]
    MissingMacAddress(String),
    #[error("io error configuring interface: {0}")]
    Io(#[from] std::io::Error),
}

/// The boundary the forwarding core consumes: device configuration, burst
/// RX/TX, and owned-MAC introspection. Collaborator described by interface
/// only in the design; this trait is the concrete shape of that interface.
pub trait PacketIo: Send + Sync {
    /// One RX queue, `num_tx_queues` TX queues (one per worker).
    fn configure_device(
        &self,
        iface: InterfaceId,
        num_tx_queues: u16,
    ) -> Result<(), PacketIoError>;

    /// Drains up to `cap` frames (never more than [`MAX_BURST_SIZE`]) from
    /// `iface`'s RX queue. Returns an empty vec if nothing is pending.
    fn rx_burst(&self, iface: InterfaceId, queue: QueueId, cap: usize) -> Vec<Frame>;

    /// Attempts to enqueue `frames` on `iface`'s TX queue `queue`. Returns
    /// the number actually accepted; callers retry the remainder.
    fn tx_burst(&self, iface: InterfaceId, queue: QueueId, frames: &[Frame]) -> usize;

    /// The interface's own Ethernet address, read from the device.
    fn owned_mac(&self, iface: InterfaceId) -> Result<MacAddr, PacketIoError>;
}
