//! In-memory [`PacketIo`] substrate for unit and integration tests: fixed
//! per-(interface, queue) buffers that script inbound frames and record
//! transmitted ones, standing in for the teacher's `test_buffer` role.

use std::collections::HashMap;
use std::sync::Mutex;

use router_net::MacAddr;

use crate::{Frame, InterfaceId, PacketIo, PacketIoError, QueueId};

struct InterfaceState {
    mac: MacAddr,
    rx_queue: Vec<Frame>,
    tx_log: HashMap<QueueId, Vec<Frame>>,
}

impl Default for InterfaceState {
    fn default() -> Self {
        InterfaceState {
            mac: MacAddr::ZERO,
            rx_queue: Vec::new(),
            tx_log: HashMap::new(),
        }
    }
}

/// Scriptable substrate: tests push inbound frames with [`TestPacketIo::push_rx`]
/// and inspect what workers transmitted with [`TestPacketIo::transmitted`].
#[derive(Default)]
pub struct TestPacketIo {
    interfaces: Mutex<HashMap<InterfaceId, InterfaceState>>,
}

impl TestPacketIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `iface` with the given owned MAC, ready for RX/TX.
    pub fn add_interface(&self, iface: InterfaceId, mac: MacAddr) {
        let mut interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        interfaces.entry(iface).or_default().mac = mac;
    }

    /// Enqueues a frame as if it had arrived on `iface`'s single RX queue.
    pub fn push_rx(&self, iface: InterfaceId, frame: Frame) {
        let mut interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        interfaces.entry(iface).or_default().rx_queue.push(frame);
    }

    /// All frames transmitted on `iface`'s `queue` so far, in send order.
    pub fn transmitted(&self, iface: InterfaceId, queue: QueueId) -> Vec<Frame> {
        let interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        interfaces
            .get(&iface)
            .and_then(|state| state.tx_log.get(&queue))
            .cloned()
            .unwrap_or_default()
    }
}

impl PacketIo for TestPacketIo {
    fn configure_device(
        &self,
        iface: InterfaceId,
        _num_tx_queues: u16,
    ) -> Result<(), PacketIoError> {
        let mut interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        interfaces.entry(iface).or_default();
        Ok(())
    }

    fn rx_burst(&self, iface: InterfaceId, _queue: QueueId, cap: usize) -> Vec<Frame> {
        let mut interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        let Some(state) = interfaces.get_mut(&iface) else {
            return Vec::new();
        };
        let take = cap.min(crate::MAX_BURST_SIZE).min(state.rx_queue.len());
        state.rx_queue.drain(..take).collect()
    }

    fn tx_burst(&self, iface: InterfaceId, queue: QueueId, frames: &[Frame]) -> usize {
        let mut interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        let Some(state) = interfaces.get_mut(&iface) else {
            return 0;
        };
        state
            .tx_log
            .entry(queue)
            .or_default()
            .extend_from_slice(frames);
        frames.len()
    }

    fn owned_mac(&self, iface: InterfaceId) -> Result<MacAddr, PacketIoError> {
        let interfaces = self.interfaces.lock().expect("test substrate lock poisoned");
        interfaces
            .get(&iface)
            .map(|state| state.mac)
            .ok_or(PacketIoError::UnknownInterface(iface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rx_burst_drains_up_to_cap() {
        let io = TestPacketIo::new();
        io.add_interface(0, MacAddr([1, 2, 3, 4, 5, 6]));
        io.push_rx(0, vec![1]);
        io.push_rx(0, vec![2]);
        io.push_rx(0, vec![3]);

        let burst = io.rx_burst(0, 0, 2);
        assert_eq!(burst, vec![vec![1], vec![2]]);
        let rest = io.rx_burst(0, 0, 2);
        assert_eq!(rest, vec![vec![3]]);
    }

    #[test]
    fn tx_burst_records_frames_per_queue() {
        let io = TestPacketIo::new();
        io.configure_device(1, 2).unwrap();
        io.tx_burst(1, 0, &[vec![9, 9]]);
        io.tx_burst(1, 1, &[vec![8, 8]]);

        assert_eq!(io.transmitted(1, 0), vec![vec![9, 9]]);
        assert_eq!(io.transmitted(1, 1), vec![vec![8, 8]]);
    }

    #[test]
    fn unknown_interface_errors() {
        let io = TestPacketIo::new();
        assert!(io.owned_mac(42).is_err());
    }
}
