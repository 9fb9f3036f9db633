//! Raw `AF_PACKET` kernel driver: one socket per configured interface,
//! non-blocking, polled with `mio`. Grounded on the teacher's
//! `dataplane/src/drivers/kernel.rs` `Kif`/`KifTable` pattern, simplified to
//! the `PacketIo` boundary — there is no worker-to-channel dispatch here,
//! that lives in the `router` crate's worker loop.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;

use afpacket::sync::RawPacketStream;
use router_net::MacAddr;
use tracing::{debug, warn};

use crate::{Frame, InterfaceId, PacketIo, PacketIoError, QueueId};

struct KernelInterface {
    name: String,
    mac: MacAddr,
    sock: Mutex<RawPacketStream>,
}

/// A [`PacketIo`] backed by raw `AF_PACKET` sockets, one per configured
/// interface. `queue` arguments are accepted for API symmetry with the
/// burst-cap/queue model the worker loop expects but are not load-balanced
/// across distinct kernel queues — a single socket serves all TX queues.
pub struct KernelPacketIo {
    interfaces: HashMap<InterfaceId, KernelInterface>,
}

impl KernelPacketIo {
    /// Opens and binds a raw packet socket for every `(id, system interface
    /// name)` pair, reading each interface's MAC address from the OS.
    pub fn new(iface_names: &[(InterfaceId, String)]) -> Result<Self, PacketIoError> {
        let system_interfaces = netdev::get_interfaces();
        let mut interfaces = HashMap::with_capacity(iface_names.len());

        for (id, name) in iface_names {
            let system_iface = system_interfaces
                .iter()
                .find(|iface| &iface.name == name)
                .ok_or(PacketIoError::UnknownInterface(*id))?;
            let mac = system_iface
                .mac_addr
                .map(|mac| MacAddr(mac.octets()))
                .ok_or_else(|| PacketIoError::MissingMacAddress(name.clone()))?;

            let mut sock = RawPacketStream::new()?;
            sock.set_non_blocking()?;
            sock.bind(name).inspect_err(|e| {
                warn!("failed to bind raw socket on interface '{name}': {e}");
            })?;
            debug!("opened raw socket on interface '{name}' (id {id}, mac {mac})");

            interfaces.insert(
                *id,
                KernelInterface {
                    name: name.clone(),
                    mac,
                    sock: Mutex::new(sock),
                },
            );
        }

        Ok(Self { interfaces })
    }

    fn interface(&self, iface: InterfaceId) -> Result<&KernelInterface, PacketIoError> {
        self.interfaces
            .get(&iface)
            .ok_or(PacketIoError::UnknownInterface(iface))
    }
}

impl PacketIo for KernelPacketIo {
    fn configure_device(
        &self,
        iface: InterfaceId,
        num_tx_queues: u16,
    ) -> Result<(), PacketIoError> {
        let interface = self.interface(iface)?;
        debug!(
            "configured interface '{}' (id {iface}) with 1 rx queue and {num_tx_queues} tx queues",
            interface.name
        );
        Ok(())
    }

    fn rx_burst(&self, iface: InterfaceId, _queue: QueueId, cap: usize) -> Vec<Frame> {
        let Ok(interface) = self.interface(iface) else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        let Ok(mut sock) = interface.sock.lock() else {
            return frames;
        };
        let mut buf = [0u8; crate::MBUF_SIZE as usize];
        while frames.len() < cap.min(crate::MAX_BURST_SIZE) {
            match sock.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => frames.push(buf[..n].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("rx error on interface '{}': {e}", interface.name);
                    break;
                }
            }
        }
        frames
    }

    fn tx_burst(&self, iface: InterfaceId, _queue: QueueId, frames: &[Frame]) -> usize {
        let Ok(interface) = self.interface(iface) else {
            return 0;
        };
        let Ok(mut sock) = interface.sock.lock() else {
            return 0;
        };
        let mut sent = 0;
        for frame in frames {
            match sock.write(frame) {
                Ok(_) => sent += 1,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("tx error on interface '{}': {e}", interface.name);
                    break;
                }
            }
        }
        sent
    }

    fn owned_mac(&self, iface: InterfaceId) -> Result<MacAddr, PacketIoError> {
        Ok(self.interface(iface)?.mac)
    }
}
