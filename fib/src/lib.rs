// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::similar_names)]

//! A DIR-24-8 style longest-prefix-match (LPM) table for IPv4.
//!
//! The table is built once from a set of routes via [`FibBuilder`], then
//! frozen into a [`Fib`] that answers [`Fib::get_next_hop`] lookups in O(1)
//! without locks. See the module-level algorithm notes on [`FibBuilder`] for
//! the two-level table layout.

use std::fmt::{self, Display, Formatter};
use tracing::{debug, info, warn};

/// Number of bits covered by the first-level direct index (`tbl24`).
const TBL_PREFIX_LEN: u8 = 24;
/// Number of entries in `tbl24`: one per possible 24-bit prefix.
const TBL24_SIZE: usize = 1 << TBL_PREFIX_LEN;
/// Number of entries in each `tbl_long` block: one per possible low-order byte.
const TBL_LONG_BLOCK_LEN: usize = 1 << (32 - TBL_PREFIX_LEN);
/// Maximum number of `tbl_long` blocks that can be allocated.
pub const MAX_LONG_BLOCKS: usize = 255;
/// Maximum number of distinct next-hop entries the FIB can hold.
///
/// `u8::MAX` (255) itself is reserved as [`INVALID_NH_ID`], so at most 255
/// routes may be registered.
pub const MAX_NEXT_HOPS: usize = 255;
/// Sentinel `nh_id` meaning "no route".
pub const INVALID_NH_ID: u16 = 255;
/// Sentinel `tbl24`/`tbl_long` slot value meaning "unoccupied".
const INVALID_SLOT: u16 = 0xFFFF;

/// Destination MAC and egress interface to use once a route has matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NextHop {
    /// Destination Ethernet address to rewrite onto the forwarded frame.
    pub mac: [u8; 6],
    /// Egress interface id.
    pub port: u8,
}

impl NextHop {
    /// Build a next hop from a MAC address and egress interface id.
    #[must_use]
    pub fn new(mac: [u8; 6], port: u8) -> Self {
        Self { mac, port }
    }
}

#[derive(Debug, Clone, Copy)]
struct NextHopInfo {
    prefix_ip: u32,
    prefix_len: u8,
    next_hop: NextHop,
    in_use: bool,
}

/// Errors that can occur while registering a route.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FibError {
    /// The FIB already holds [`MAX_NEXT_HOPS`] routes.
    #[error("FIB capacity exceeded: at most {MAX_NEXT_HOPS} routes may be registered")]
    CapacityExceeded,
    /// Allocating a new `tbl_long` block would exceed [`MAX_LONG_BLOCKS`].
    #[error("tbl_long capacity exceeded: at most {MAX_LONG_BLOCKS} blocks may be allocated")]
    LongTableExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TblEntry(u16);

impl TblEntry {
    const INVALID: TblEntry = TblEntry(INVALID_SLOT);

    fn is_invalid(self) -> bool {
        self.0 == INVALID_SLOT
    }

    fn is_long(self) -> bool {
        !self.is_invalid() && self.0 & 0x8000 != 0
    }

    fn payload(self) -> u16 {
        self.0 & 0x7FFF
    }

    fn leaf(nh_id: u16) -> Self {
        TblEntry(nh_id & 0x7FFF)
    }

    fn long(block: u16) -> Self {
        TblEntry((block & 0x7FFF) | 0x8000)
    }
}

/// Accumulates routes, then freezes them into a read-only [`Fib`].
///
/// Mirrors the "build-once, read-many" discipline of the reference design:
/// routes are only valid to add before [`FibBuilder::build`] consumes the
/// builder, so there is no way to mutate a [`Fib`] once forwarding starts.
#[derive(Debug, Default)]
pub struct FibBuilder {
    next_hops: Vec<NextHopInfo>,
}

impl FibBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a route.
    ///
    /// `prefix_len` greater than 32 is clamped to 32, matching the reference
    /// implementation's handling of over-long prefixes.
    ///
    /// # Errors
    ///
    /// Returns [`FibError::CapacityExceeded`] if the builder already holds
    /// [`MAX_NEXT_HOPS`] routes.
    pub fn add_route(
        &mut self,
        prefix_ip: u32,
        prefix_len: u8,
        next_hop: NextHop,
    ) -> Result<(), FibError> {
        if self.next_hops.len() >= MAX_NEXT_HOPS {
            warn!("FIB capacity exceeded while adding route for {prefix_ip:#010x}");
            return Err(FibError::CapacityExceeded);
        }
        let prefix_len = prefix_len.min(32);
        debug!(prefix_ip = format!("{prefix_ip:#010x}"), prefix_len, port = next_hop.port, "route accepted");
        self.next_hops.push(NextHopInfo {
            prefix_ip,
            prefix_len,
            next_hop,
            in_use: true,
        });
        Ok(())
    }

    /// Finalize the FIB.
    ///
    /// # Errors
    ///
    /// Returns [`FibError::LongTableExhausted`] if more than
    /// [`MAX_LONG_BLOCKS`] prefixes longer than 24 bits conflict in `tbl24`.
    pub fn build(self) -> Result<Fib, FibError> {
        let mut tbl24 = vec![TblEntry::INVALID; TBL24_SIZE].into_boxed_slice();
        let mut tbl_long: Vec<[u16; TBL_LONG_BLOCK_LEN]> = Vec::new();

        for (nh_id, info) in self.next_hops.iter().enumerate() {
            if !info.in_use {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let nh_id = nh_id as u16;
            if info.prefix_len <= TBL_PREFIX_LEN {
                build_route_lte_24(&mut tbl24, &mut tbl_long, &self.next_hops, nh_id, info);
            } else {
                build_route_gt_24(&mut tbl24, &mut tbl_long, &self.next_hops, nh_id, info)?;
            }
        }

        info!(
            routes = self.next_hops.len(),
            long_blocks = tbl_long.len(),
            "FIB build complete"
        );

        Ok(Fib {
            tbl24,
            tbl_long,
            next_hops: self.next_hops,
        })
    }
}

/// "Longer wins" tie-break: does `challenger` replace `incumbent`?
///
/// Per the reference policy, a later insertion wins ties: a route replaces
/// the incumbent whenever its prefix length is `>=` the incumbent's.
fn wins(incumbent_prefix_len: u8, challenger_prefix_len: u8) -> bool {
    challenger_prefix_len >= incumbent_prefix_len
}

fn build_route_lte_24(
    tbl24: &mut [TblEntry],
    tbl_long: &mut Vec<[u16; TBL_LONG_BLOCK_LEN]>,
    next_hops: &[NextHopInfo],
    nh_id: u16,
    info: &NextHopInfo,
) {
    let shift = TBL_PREFIX_LEN - info.prefix_len;
    // A /0 route (the default route) matches every address; avoid a
    // shift-by-32, which overflows u32, by special-casing it to index 0.
    let prefix_bits = if info.prefix_len == 0 {
        0
    } else {
        info.prefix_ip >> (32 - info.prefix_len)
    };
    let min_index = prefix_bits << shift;
    let max_index = min_index | ((1u32 << shift) - 1);

    for idx in min_index..=max_index {
        lte_24_into_idx(tbl24, tbl_long, next_hops, nh_id, idx as usize);
    }
}

fn lte_24_into_idx(
    tbl24: &mut [TblEntry],
    tbl_long: &mut [[u16; TBL_LONG_BLOCK_LEN]],
    next_hops: &[NextHopInfo],
    nh_id: u16,
    idx: usize,
) {
    let entry = tbl24[idx];
    if entry.is_invalid() {
        tbl24[idx] = TblEntry::leaf(nh_id);
        return;
    }
    if entry.is_long() {
        let block = &mut tbl_long[entry.payload() as usize];
        merge_into_long_block(block, next_hops, nh_id);
        return;
    }
    let incumbent = entry.payload();
    if wins(next_hops[incumbent as usize].prefix_len, next_hops[nh_id as usize].prefix_len) {
        tbl24[idx] = TblEntry::leaf(nh_id);
    }
}

/// Fill every slot of a `tbl_long` block with `nh_id`, respecting "longer wins".
fn merge_into_long_block(block: &mut [u16; TBL_LONG_BLOCK_LEN], next_hops: &[NextHopInfo], nh_id: u16) {
    for slot in block.iter_mut() {
        if *slot == INVALID_NH_ID {
            *slot = nh_id;
            continue;
        }
        if wins(next_hops[*slot as usize].prefix_len, next_hops[nh_id as usize].prefix_len) {
            *slot = nh_id;
        }
    }
}

/// Fill only the low-byte range `[low_min, low_max]` of a `tbl_long` block.
fn fill_long_block_range(
    block: &mut [u16; TBL_LONG_BLOCK_LEN],
    next_hops: &[NextHopInfo],
    nh_id: u16,
    low_min: u32,
    low_max: u32,
    overwrite_unconditionally: bool,
) {
    for i in low_min..=low_max {
        let slot = &mut block[i as usize];
        if *slot == INVALID_NH_ID || overwrite_unconditionally {
            *slot = nh_id;
            continue;
        }
        if wins(next_hops[*slot as usize].prefix_len, next_hops[nh_id as usize].prefix_len) {
            *slot = nh_id;
        }
    }
}

fn low_byte_range(info: &NextHopInfo) -> (u32, u32) {
    let low_bits = 32 - TBL_PREFIX_LEN;
    let min = (info.prefix_ip & ((1 << low_bits) - 1)) & !((1u32 << (32 - info.prefix_len)) - 1);
    let max = min | ((1u32 << (32 - info.prefix_len)) - 1);
    (min, max)
}

fn alloc_long_block(tbl_long: &mut Vec<[u16; TBL_LONG_BLOCK_LEN]>) -> Result<u16, FibError> {
    if tbl_long.len() >= MAX_LONG_BLOCKS {
        return Err(FibError::LongTableExhausted);
    }
    tbl_long.push([INVALID_NH_ID; TBL_LONG_BLOCK_LEN]);
    #[allow(clippy::cast_possible_truncation)]
    Ok((tbl_long.len() - 1) as u16)
}

fn build_route_gt_24(
    tbl24: &mut [TblEntry],
    tbl_long: &mut Vec<[u16; TBL_LONG_BLOCK_LEN]>,
    next_hops: &[NextHopInfo],
    nh_id: u16,
    info: &NextHopInfo,
) -> Result<(), FibError> {
    let idx = (info.prefix_ip >> (32 - TBL_PREFIX_LEN)) as usize;
    let entry = tbl24[idx];
    let (low_min, low_max) = low_byte_range(info);

    if entry.is_invalid() {
        let block_id = alloc_long_block(tbl_long)?;
        tbl24[idx] = TblEntry::long(block_id);
        fill_long_block_range(&mut tbl_long[block_id as usize], next_hops, nh_id, low_min, low_max, true);
        return Ok(());
    }

    if !entry.is_long() {
        // Promote: a shorter-or-equal prefix already claims this /24. Allocate a
        // fresh block, seed it with the new route, then propagate the old
        // resident route across the whole block (never overwriting the new route).
        let incumbent_nh_id = entry.payload();
        let block_id = alloc_long_block(tbl_long)?;
        tbl24[idx] = TblEntry::long(block_id);
        fill_long_block_range(&mut tbl_long[block_id as usize], next_hops, nh_id, low_min, low_max, true);
        merge_into_long_block(&mut tbl_long[block_id as usize], next_hops, incumbent_nh_id);
        return Ok(());
    }

    fill_long_block_range(&mut tbl_long[entry.payload() as usize], next_hops, nh_id, low_min, low_max, false);
    Ok(())
}

/// A build-once, read-many IPv4 longest-prefix-match table.
///
/// `Fib` is immutable and safe to share across worker threads without
/// synchronization: every lookup is pure and touches no shared mutable
/// state.
#[derive(Debug)]
pub struct Fib {
    tbl24: Box<[TblEntry]>,
    tbl_long: Vec<[u16; TBL_LONG_BLOCK_LEN]>,
    next_hops: Vec<NextHopInfo>,
}

impl Fib {
    /// Look up the next hop for a host-order destination address.
    ///
    /// Returns `None` if no configured route covers `ip`.
    #[must_use]
    pub fn get_next_hop(&self, ip: u32) -> Option<&NextHop> {
        let idx = (ip >> (32 - TBL_PREFIX_LEN)) as usize;
        let entry = self.tbl24[idx];
        if entry.is_invalid() {
            return None;
        }
        let nh_id = if entry.is_long() {
            let low = ip & ((1 << (32 - TBL_PREFIX_LEN)) - 1);
            self.tbl_long[entry.payload() as usize][low as usize]
        } else {
            entry.payload()
        };
        if nh_id == INVALID_NH_ID {
            return None;
        }
        Some(&self.next_hops[nh_id as usize].next_hop)
    }

    /// Number of routes folded into this table.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.next_hops.iter().filter(|nh| nh.in_use).count()
    }

    /// Number of `tbl_long` blocks allocated during the build.
    #[must_use]
    pub fn long_block_count(&self) -> usize {
        self.tbl_long.len()
    }
}

impl Display for Fib {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fib({} routes, {} tbl_long blocks)",
            self.route_count(),
            self.long_block_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
        u32::from_be_bytes([a, b, c, d])
    }

    fn nh(port: u8) -> NextHop {
        NextHop::new([0xaa, 0xaa, 0xaa, 0xaa, 0xaa, port], port)
    }

    #[test]
    fn s1_overlapping_24_and_32() {
        let mut b = FibBuilder::new();
        b.add_route(ip(10, 0, 10, 0), 24, nh(0)).unwrap();
        b.add_route(ip(10, 0, 10, 10), 32, nh(1)).unwrap();
        let fib = b.build().unwrap();

        assert_eq!(fib.get_next_hop(ip(10, 0, 10, 10)).unwrap().port, 1);
        assert_eq!(fib.get_next_hop(ip(10, 0, 10, 0)).unwrap().port, 0);
        assert_eq!(fib.get_next_hop(ip(10, 0, 10, 9)).unwrap().port, 0);
        assert_eq!(fib.get_next_hop(ip(10, 0, 10, 11)).unwrap().port, 0);
        assert_eq!(fib.get_next_hop(ip(10, 0, 10, 255)).unwrap().port, 0);
        assert!(fib.get_next_hop(ip(10, 0, 9, 255)).is_none());
        assert!(fib.get_next_hop(ip(10, 0, 11, 0)).is_none());
    }

    #[test]
    fn s2_default_route() {
        let mut b = FibBuilder::new();
        b.add_route(0, 0, nh(2)).unwrap();
        b.add_route(ip(192, 168, 0, 0), 16, nh(3)).unwrap();
        let fib = b.build().unwrap();

        assert_eq!(fib.get_next_hop(ip(8, 8, 8, 8)).unwrap().port, 2);
        assert_eq!(fib.get_next_hop(ip(192, 168, 1, 1)).unwrap().port, 3);
    }

    #[test]
    fn longest_prefix_dominance_above_24() {
        let mut b = FibBuilder::new();
        b.add_route(ip(10, 0, 0, 0), 16, nh(0)).unwrap();
        b.add_route(ip(10, 0, 5, 0), 28, nh(1)).unwrap();
        let fib = b.build().unwrap();

        assert_eq!(fib.get_next_hop(ip(10, 0, 5, 3)).unwrap().port, 1);
        assert_eq!(fib.get_next_hop(ip(10, 0, 5, 200)).unwrap().port, 0);
        assert_eq!(fib.get_next_hop(ip(10, 0, 99, 1)).unwrap().port, 0);
    }

    #[test]
    fn promotion_preserves_lte24_sibling_slots() {
        // /24 route installed first, then a /28 that forces promotion of the
        // same tbl24 slot to a tbl_long block — the /24's other low bytes must
        // survive the promotion.
        let mut b = FibBuilder::new();
        b.add_route(ip(172, 16, 5, 0), 24, nh(7)).unwrap();
        b.add_route(ip(172, 16, 5, 16), 28, nh(9)).unwrap();
        let fib = b.build().unwrap();

        assert_eq!(fib.get_next_hop(ip(172, 16, 5, 20)).unwrap().port, 9);
        assert_eq!(fib.get_next_hop(ip(172, 16, 5, 1)).unwrap().port, 7);
        assert_eq!(fib.get_next_hop(ip(172, 16, 5, 200)).unwrap().port, 7);
    }

    #[test]
    fn no_spurious_matches() {
        let mut b = FibBuilder::new();
        b.add_route(ip(203, 0, 113, 0), 24, nh(0)).unwrap();
        let fib = b.build().unwrap();
        assert!(fib.get_next_hop(ip(203, 0, 113, 7)).unwrap().port == 0);
        assert!(fib.get_next_hop(ip(203, 0, 114, 0)).is_none());
    }

    #[test]
    fn boundary_span_lte_24() {
        let mut b = FibBuilder::new();
        b.add_route(ip(10, 1, 0, 0), 20, nh(0)).unwrap();
        let fib = b.build().unwrap();
        // a /20 covers 2^(24-20) = 16 contiguous /24 blocks.
        for i in 0..16u8 {
            assert!(fib.get_next_hop(ip(10, 1, i, 0)).is_some());
        }
        assert!(fib.get_next_hop(ip(10, 1, 16, 0)).is_none());
    }

    #[test]
    fn capacity_exceeded_is_fatal() {
        let mut b = FibBuilder::new();
        for i in 0..MAX_NEXT_HOPS {
            #[allow(clippy::cast_possible_truncation)]
            b.add_route(ip(10, 0, 0, i as u8), 32, nh(0)).unwrap();
        }
        let err = b.add_route(ip(10, 0, 1, 0), 32, nh(0)).unwrap_err();
        assert_eq!(err, FibError::CapacityExceeded);
    }

    #[test]
    fn equal_length_ties_go_to_later_insertion() {
        let mut b = FibBuilder::new();
        b.add_route(ip(10, 0, 0, 0), 24, nh(1)).unwrap();
        b.add_route(ip(10, 0, 0, 0), 24, nh(2)).unwrap();
        let fib = b.build().unwrap();
        assert_eq!(fib.get_next_hop(ip(10, 0, 0, 5)).unwrap().port, 2);
    }

    #[test]
    fn idempotent_rebuild_yields_same_lookups() {
        let mut b1 = FibBuilder::new();
        b1.add_route(ip(10, 0, 0, 0), 8, nh(1)).unwrap();
        b1.add_route(ip(10, 10, 0, 0), 16, nh(2)).unwrap();
        let fib1 = b1.build().unwrap();

        let mut b2 = FibBuilder::new();
        b2.add_route(ip(10, 0, 0, 0), 8, nh(1)).unwrap();
        b2.add_route(ip(10, 10, 0, 0), 16, nh(2)).unwrap();
        let fib2 = b2.build().unwrap();

        for probe in [ip(10, 10, 1, 1), ip(10, 5, 5, 5), ip(11, 0, 0, 0)] {
            assert_eq!(fib1.get_next_hop(probe).map(|n| n.port), fib2.get_next_hop(probe).map(|n| n.port));
        }
    }

    #[test]
    fn prefix_len_clamped_to_32() {
        let mut b = FibBuilder::new();
        b.add_route(ip(1, 2, 3, 4), 200, nh(5)).unwrap();
        let fib = b.build().unwrap();
        assert_eq!(fib.get_next_hop(ip(1, 2, 3, 4)).unwrap().port, 5);
        assert!(fib.get_next_hop(ip(1, 2, 3, 5)).is_none());
    }
}
