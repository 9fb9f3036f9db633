//! Per-core forwarding hot loop: burst RX, validate, dispatch to the IPv4
//! pipeline or the ARP responder, burst TX with bounded retry.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use router_config::InterfaceConfig;
use router_fib::{Fib, NextHop};
use router_net::mac::MacAddr;
use router_net::{arp, eth, ipv4, validate_frame, FrameKind};
use tracing::{trace, warn};

use pktio::{Frame, InterfaceId, PacketIo, QueueId, MAX_BURST_SIZE};

/// How long a worker sleeps when every assigned interface's burst was empty.
const IDLE_BACKOFF: Duration = Duration::from_micros(100);
/// Bounded retry budget for a TX-queue-full burst-send attempt.
const MAX_TRANSMIT_TRIAL: usize = 10;

/// Everything a single worker thread owns: its TX queue id (shared across
/// every egress interface it forwards to) and the interfaces it polls RX on.
pub struct WorkerConfig {
    pub tx_queue: QueueId,
    pub assigned_interfaces: Vec<InterfaceConfig>,
}

/// Runs the burst-poll loop until `force_quit` is observed at the top of an
/// iteration. `all_interfaces` is the full registered set (not just this
/// worker's assigned ones) because ARP target-ownership checks span every
/// interface, not only the receiving one.
pub fn run(
    fib: &Fib,
    io: &dyn PacketIo,
    all_interfaces: &[InterfaceConfig],
    cfg: &WorkerConfig,
    force_quit: &AtomicBool,
) {
    while !force_quit.load(Ordering::Relaxed) {
        let mut any_received = false;

        for iface in &cfg.assigned_interfaces {
            let burst = io.rx_burst(iface.id, 0, MAX_BURST_SIZE);
            if burst.is_empty() {
                continue;
            }
            any_received = true;
            for frame in burst {
                dispatch_frame(frame, iface, all_interfaces, fib, io, cfg.tx_queue);
            }
        }

        if !any_received {
            std::thread::sleep(IDLE_BACKOFF);
        }
    }
}

fn dispatch_frame(
    frame: Frame,
    receiving_iface: &InterfaceConfig,
    all_interfaces: &[InterfaceConfig],
    fib: &Fib,
    io: &dyn PacketIo,
    tx_queue: QueueId,
) {
    match validate_frame(&frame, receiving_iface.mac) {
        Ok(FrameKind::Ipv4) => handle_ipv4(frame, receiving_iface, fib, io, tx_queue),
        Ok(FrameKind::Arp) => handle_arp(frame, receiving_iface, all_interfaces, io, tx_queue),
        Ok(FrameKind::Ipv6) => trace!("dropping ipv6 frame on iface {}: no handler", receiving_iface.id),
        Err(e) => trace!("dropping frame on iface {}: {e}", receiving_iface.id),
    }
}

fn handle_ipv4(
    mut frame: Frame,
    receiving_iface: &InterfaceConfig,
    fib: &Fib,
    io: &dyn PacketIo,
    tx_queue: QueueId,
) {
    let (egress_iface, dst_mac) = {
        let view = match ipv4::validate(&frame) {
            Ok(view) => view,
            Err(e) => {
                trace!("dropping invalid ipv4 header on iface {}: {e}", receiving_iface.id);
                return;
            }
        };
        let Some(NextHop { mac, port }) = fib.get_next_hop(view.destination()).copied() else {
            trace!("no route for destination on iface {}", receiving_iface.id);
            return;
        };
        (port, MacAddr(mac))
    };

    if ipv4::decrement_ttl_and_recompute_checksum(&mut frame).is_none() {
        trace!("dropping ttl-expired frame on iface {}", receiving_iface.id);
        return;
    }

    let Ok(src_mac) = io.owned_mac(egress_iface) else {
        warn!("egress interface {egress_iface} has no owned mac, dropping frame");
        return;
    };
    eth::set_destination(&mut frame, dst_mac);
    eth::set_source(&mut frame, src_mac);

    transmit_with_retry(io, egress_iface, tx_queue, frame);
}

fn handle_arp(
    mut frame: Frame,
    receiving_iface: &InterfaceConfig,
    all_interfaces: &[InterfaceConfig],
    io: &dyn PacketIo,
    tx_queue: QueueId,
) {
    let Some(request) = arp::parse_request(&frame) else {
        trace!("dropping malformed/non-request arp frame on iface {}", receiving_iface.id);
        return;
    };
    let target_ip = request.target_ip();
    if !all_interfaces
        .iter()
        .any(|iface| u32::from(iface.ip) == target_ip)
    {
        trace!("arp target {} not locally owned, dropping", Ipv4Addr::from(target_ip));
        return;
    }

    arp::build_reply_in_place(&mut frame, receiving_iface.mac);
    transmit_with_retry(io, receiving_iface.id, tx_queue, frame);
}

/// Attempts the burst send up to [`MAX_TRANSMIT_TRIAL`] times; releases the
/// frame (drops it) if every attempt finds the TX queue full.
fn transmit_with_retry(io: &dyn PacketIo, iface: InterfaceId, queue: QueueId, frame: Frame) {
    for _ in 0..MAX_TRANSMIT_TRIAL {
        if io.tx_burst(iface, queue, std::slice::from_ref(&frame)) == 1 {
            return;
        }
    }
    warn!("tx queue full after {MAX_TRANSMIT_TRIAL} attempts on iface {iface}, dropping frame");
}
