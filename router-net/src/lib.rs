//! Ethernet/ARP/IPv4 framing types and the frame validator.
//!
//! Mutation is always in place on the raw frame buffer: header fields are
//! parsed with `etherparse` for structural validation and checksum
//! recomputation, but TTL decrement, checksum write-back and MAC rewrites are
//! applied directly at fixed byte offsets so the payload bytes are never
//! touched.

pub mod arp;
pub mod eth;
pub mod ipv4;
pub mod mac;

pub use eth::{EtherType, ETH_HEADER_LEN};
pub use mac::MacAddr;

use thiserror::Error;

/// Minimum length of an Ethernet II frame this router will look at: header
/// plus nothing. Anything shorter cannot even carry an EtherType.
pub const MIN_FRAME_LEN: usize = ETH_HEADER_LEN;

/// `ETHER_MAX_LEN - ETHER_CRC_LEN`: the largest Ethernet II frame (header
/// plus payload, excluding the trailing CRC) this router will forward.
pub const MAX_FRAME_LEN: usize = 1514;

const IPV4_MIN_PAYLOAD_LEN: usize = 20;
const IPV6_MIN_PAYLOAD_LEN: usize = 40;
const ARP_MIN_PAYLOAD_LEN: usize = 28;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("destination mac is neither broadcast nor the receiving interface's own address")]
    WrongDestination,
    #[error("unsupported ethertype {0:#06x}")]
    UnsupportedEtherType(u16),
    #[error("frame too long: {0} bytes")]
    TooLong(usize),
}

/// What a validated frame turned out to be, so the worker can route it to
/// the right stage without re-parsing the Ethernet header.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameKind {
    Ipv4,
    Ipv6,
    Arp,
}

/// Layer-2 gate applied before any IPv4/ARP parsing: length, destination
/// ownership, recognized EtherType, per-EtherType minimum payload length,
/// and maximum frame length, in that order. `own_mac` is the receiving
/// interface's owned MAC — poll-mode RX is promiscuous, so frames destined
/// for other hosts on the same wire must be rejected here rather than
/// forwarded.
pub fn validate_frame(frame: &[u8], own_mac: MacAddr) -> Result<FrameKind, FrameError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort(frame.len()));
    }
    let dst = eth::destination(frame);
    if !dst.is_broadcast() && dst != own_mac {
        return Err(FrameError::WrongDestination);
    }
    let (kind, min_payload_len) = match eth::ethertype(frame) {
        EtherType::Ipv4 => (FrameKind::Ipv4, IPV4_MIN_PAYLOAD_LEN),
        EtherType::Ipv6 => (FrameKind::Ipv6, IPV6_MIN_PAYLOAD_LEN),
        EtherType::Arp => (FrameKind::Arp, ARP_MIN_PAYLOAD_LEN),
        EtherType::Other(raw) => return Err(FrameError::UnsupportedEtherType(raw)),
    };
    if frame.len() < ETH_HEADER_LEN + min_payload_len {
        return Err(FrameError::TooShort(frame.len()));
    }
    if frame.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLong(frame.len()));
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const OWN_MAC: MacAddr = MacAddr([0xaa; 6]);

    fn ipv4_sized_frame(dst: MacAddr) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HEADER_LEN + IPV4_MIN_PAYLOAD_LEN];
        eth::set_destination(&mut frame, dst);
        frame[12] = 0x08;
        frame[13] = 0x00;
        frame
    }

    #[test]
    fn rejects_short_frames() {
        let frame = [0u8; 10];
        assert_eq!(
            validate_frame(&frame, OWN_MAC),
            Err(FrameError::TooShort(10))
        );
    }

    #[test]
    fn rejects_frames_not_addressed_to_us() {
        let frame = ipv4_sized_frame(MacAddr([0xbb; 6]));
        assert_eq!(
            validate_frame(&frame, OWN_MAC),
            Err(FrameError::WrongDestination)
        );
    }

    #[test]
    fn accepts_broadcast_destination() {
        let frame = ipv4_sized_frame(MacAddr::BROADCAST);
        assert_eq!(validate_frame(&frame, OWN_MAC), Ok(FrameKind::Ipv4));
    }

    #[test]
    fn rejects_unknown_ethertype() {
        let mut frame = ipv4_sized_frame(OWN_MAC);
        frame[12] = 0x88;
        frame[13] = 0xcc; // LLDP
        assert_eq!(
            validate_frame(&frame, OWN_MAC),
            Err(FrameError::UnsupportedEtherType(0x88cc))
        );
    }

    #[test]
    fn rejects_frame_shorter_than_ethertype_minimum() {
        let mut frame = vec![0u8; ETH_HEADER_LEN + IPV4_MIN_PAYLOAD_LEN - 1];
        eth::set_destination(&mut frame, OWN_MAC);
        frame[12] = 0x08;
        frame[13] = 0x00;
        assert_eq!(
            validate_frame(&frame, OWN_MAC),
            Err(FrameError::TooShort(frame.len()))
        );
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut frame = ipv4_sized_frame(OWN_MAC);
        frame.resize(MAX_FRAME_LEN + 1, 0);
        assert_eq!(
            validate_frame(&frame, OWN_MAC),
            Err(FrameError::TooLong(frame.len()))
        );
    }

    #[test]
    fn recognizes_ipv6_as_a_distinct_unforwarded_kind() {
        let mut frame = vec![0u8; ETH_HEADER_LEN + IPV6_MIN_PAYLOAD_LEN];
        eth::set_destination(&mut frame, OWN_MAC);
        frame[12] = 0x86;
        frame[13] = 0xdd;
        assert_eq!(validate_frame(&frame, OWN_MAC), Ok(FrameKind::Ipv6));
    }

    #[test]
    fn accepts_ipv4_and_arp() {
        let ipv4_frame = ipv4_sized_frame(OWN_MAC);
        assert_eq!(validate_frame(&ipv4_frame, OWN_MAC), Ok(FrameKind::Ipv4));

        let mut arp_frame = vec![0u8; ETH_HEADER_LEN + ARP_MIN_PAYLOAD_LEN];
        eth::set_destination(&mut arp_frame, OWN_MAC);
        arp_frame[12] = 0x08;
        arp_frame[13] = 0x06;
        assert_eq!(validate_frame(&arp_frame, OWN_MAC), Ok(FrameKind::Arp));
    }
}
