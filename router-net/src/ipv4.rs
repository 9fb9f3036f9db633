//! IPv4 header validation and in-place mutation.
//!
//! Validation reads fixed offsets directly so the check order in
//! RFC 1812 §5.2.2 is exactly as specified. Checksum recomputation is
//! delegated to `etherparse`, which already implements the standard
//! one's-complement sum; everything else is a direct byte write so the
//! payload past the header is never touched.

use crate::eth::ETH_HEADER_LEN;
use etherparse::Ipv4HeaderSlice;
use thiserror::Error;

const TTL_OFFSET: usize = ETH_HEADER_LEN + 8;
const CHECKSUM_OFFSET: usize = ETH_HEADER_LEN + 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Ipv4Error {
    #[error("header checksum mismatch")]
    ChecksumMismatch,
    #[error("unsupported ip version {0}")]
    WrongVersion(u8),
    #[error("ihl {0} smaller than minimum header")]
    IhlTooSmall(u8),
    #[error("total length {total_len} shorter than header ({header_len} bytes)")]
    TotalLenShorterThanHeader { total_len: u16, header_len: usize },
    #[error("total length {total_len} exceeds frame payload of {payload_len} bytes")]
    TotalLenExceedsFrame { total_len: u16, payload_len: usize },
    #[error("time to live is already zero")]
    TtlZero,
}

/// A validated IPv4 header borrowed from a frame buffer.
#[derive(Debug)]
pub struct Ipv4View<'a> {
    header: Ipv4HeaderSlice<'a>,
}

impl<'a> Ipv4View<'a> {
    pub fn destination(&self) -> u32 {
        u32::from_be_bytes(self.header.destination())
    }

    pub fn ttl(&self) -> u8 {
        self.header.ttl()
    }

    pub fn header_len(&self) -> usize {
        usize::from(self.header.ihl()) * 4
    }
}

/// Runs the six RFC 1812 §5.2.2 checks, in order, against the IPv4 header
/// that starts right after the Ethernet header in `frame`.
pub fn validate(frame: &[u8]) -> Result<Ipv4View<'_>, Ipv4Error> {
    let ip_bytes = &frame[ETH_HEADER_LEN..];
    let header = Ipv4HeaderSlice::from_slice(ip_bytes).map_err(|_| Ipv4Error::IhlTooSmall(0))?;

    let expected_checksum = header.to_header().calc_header_checksum();
    if header.header_checksum() != expected_checksum {
        return Err(Ipv4Error::ChecksumMismatch);
    }
    if header.version() != 4 {
        return Err(Ipv4Error::WrongVersion(header.version()));
    }
    if header.ihl() < 5 {
        return Err(Ipv4Error::IhlTooSmall(header.ihl()));
    }
    let header_len = usize::from(header.ihl()) * 4;
    let total_len = header.total_len();
    if usize::from(total_len) < header_len {
        return Err(Ipv4Error::TotalLenShorterThanHeader {
            total_len,
            header_len,
        });
    }
    let payload_len = frame.len() - ETH_HEADER_LEN;
    if usize::from(total_len) > payload_len {
        return Err(Ipv4Error::TotalLenExceedsFrame {
            total_len,
            payload_len,
        });
    }
    if header.ttl() == 0 {
        return Err(Ipv4Error::TtlZero);
    }

    Ok(Ipv4View { header })
}

/// Decrements TTL and recomputes the header checksum in place. Returns the
/// new TTL, or `None` (frame must be dropped, no mutation applied) if the
/// decrement would reach zero.
pub fn decrement_ttl_and_recompute_checksum(frame: &mut [u8]) -> Option<u8> {
    let ttl = frame[TTL_OFFSET];
    let new_ttl = ttl.checked_sub(1)?;
    if new_ttl == 0 {
        return None;
    }
    frame[TTL_OFFSET] = new_ttl;

    // Re-read via the IHL byte directly rather than `validate()`: the
    // checksum in the buffer is still the pre-decrement one at this point
    // and would fail the checksum check `validate()` performs.
    let ihl = frame[ETH_HEADER_LEN] & 0x0f;
    let header_len = usize::from(ihl) * 4;
    let ip_bytes = &frame[ETH_HEADER_LEN..ETH_HEADER_LEN + header_len];
    let mut header = Ipv4HeaderSlice::from_slice(ip_bytes)
        .expect("header re-read after ttl write")
        .to_header();
    header.header_checksum = 0;
    let checksum = header.calc_header_checksum();
    frame[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());

    Some(new_ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_ipv4_frame(ttl: u8) -> Vec<u8> {
        let mut frame = vec![0u8; ETH_HEADER_LEN];
        frame[12] = 0x08;
        frame[13] = 0x00;

        let mut header = etherparse::Ipv4Header::new(
            0,
            ttl,
            etherparse::IpNumber::UDP,
            [192, 168, 1, 1],
            [10, 0, 10, 10],
        )
        .unwrap();
        header.header_checksum = header.calc_header_checksum();
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(b"payload-bytes");
        frame
    }

    #[test]
    fn validates_well_formed_header() {
        let frame = sample_ipv4_frame(64);
        let view = validate(&frame).unwrap();
        assert_eq!(view.destination(), u32::from_be_bytes([10, 0, 10, 10]));
        assert_eq!(view.ttl(), 64);
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut frame = sample_ipv4_frame(64);
        frame[ETH_HEADER_LEN + 10] ^= 0xff;
        assert_eq!(validate(&frame).unwrap_err(), Ipv4Error::ChecksumMismatch);
    }

    #[test]
    fn rejects_zero_ttl() {
        let frame = sample_ipv4_frame(0);
        assert_eq!(validate(&frame).unwrap_err(), Ipv4Error::TtlZero);
    }

    #[test]
    fn decrements_ttl_and_fixes_checksum_payload_untouched() {
        let mut frame = sample_ipv4_frame(64);
        let payload_before = frame[ETH_HEADER_LEN + 20..].to_vec();

        let new_ttl = decrement_ttl_and_recompute_checksum(&mut frame).unwrap();
        assert_eq!(new_ttl, 63);

        let view = validate(&frame).unwrap();
        assert_eq!(view.ttl(), 63);
        assert_eq!(frame[ETH_HEADER_LEN + 20..], payload_before[..]);
    }

    #[test]
    fn ttl_one_decrements_to_zero_and_signals_drop() {
        let mut frame = sample_ipv4_frame(1);
        // validate() would already reject ttl==0 on re-entry, but the
        // decrement helper itself must refuse to write a ttl=0 header.
        assert!(decrement_ttl_and_recompute_checksum(&mut frame).is_none());
    }
}
