//! Startup coordinator: parses configuration, builds the FIB once,
//! distributes interfaces round-robin across workers, launches worker
//! threads, and joins them on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use router_config::{Cli, ConfigError, InterfaceConfig};
use router_fib::{FibBuilder, FibError, NextHop};
use thiserror::Error;
use tracing::info;

use pktio::kernel::KernelPacketIo;
use pktio::{PacketIo, PacketIoError};

use crate::worker::{self, WorkerConfig};

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("fib build error: {0}")]
    Fib(#[from] FibError),
    #[error("packet i/o error: {0}")]
    PacketIo(#[from] PacketIoError),
}

/// Maps this router's numeric interface ids to the system interface names
/// the kernel driver needs to bind a raw socket to. The core's CLI only
/// carries numeric ids (per spec), so this association is a deployment
/// convention: id `N` binds to system interface `ethN`.
fn system_interface_name(id: u8) -> String {
    format!("eth{id}")
}

/// Parses argv, builds the FIB, launches `worker_count` worker threads
/// (each pinned to a disjoint set of interfaces and its own TX queue), and
/// blocks until `force_quit` is set by a SIGINT/SIGTERM handler.
pub fn run(worker_count: usize, force_quit: Arc<AtomicBool>) -> Result<(), DispatcherError> {
    let cli = Cli::try_parse().map_err(|e| {
        e.print().ok();
        ConfigError::Usage(e.to_string())
    })?;

    let mut fib_builder = FibBuilder::new();
    for route in &cli.routes {
        fib_builder.add_route(
            u32::from(route.prefix_ip),
            route.prefix_len,
            NextHop::new(route.mac.into(), route.iface),
        )?;
    }
    let fib = Arc::new(fib_builder.build()?);
    info!("{fib}");

    let iface_names: Vec<(u8, String)> = cli
        .interfaces
        .iter()
        .map(|spec| (spec.id, system_interface_name(spec.id)))
        .collect();
    let io: Arc<dyn PacketIo> = Arc::new(KernelPacketIo::new(&iface_names)?);

    let interfaces: Vec<InterfaceConfig> = cli
        .interfaces
        .iter()
        .map(|spec| {
            let mac = io.owned_mac(spec.id)?;
            Ok(InterfaceConfig::new(*spec, mac))
        })
        .collect::<Result<_, PacketIoError>>()?;
    let interfaces = Arc::new(interfaces);

    let worker_count = worker_count.max(1);
    for iface in &*interfaces {
        io.configure_device(iface.id, worker_count as u16)?;
    }

    let mut worker_interfaces: Vec<Vec<InterfaceConfig>> = vec![Vec::new(); worker_count];
    for (idx, iface) in interfaces.iter().enumerate() {
        worker_interfaces[idx % worker_count].push(*iface);
    }

    info!("spawning {worker_count} workers");
    let handles: Vec<_> = worker_interfaces
        .into_iter()
        .enumerate()
        .map(|(tx_queue, assigned_interfaces)| {
            let fib = Arc::clone(&fib);
            let io = Arc::clone(&io);
            let interfaces = Arc::clone(&interfaces);
            let force_quit = Arc::clone(&force_quit);
            std::thread::spawn(move || {
                let cfg = WorkerConfig {
                    tx_queue: tx_queue as u16,
                    assigned_interfaces,
                };
                worker::run(&fib, io.as_ref(), &interfaces, &cfg, force_quit.as_ref());
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
    info!("all workers joined, shutting down");
    Ok(())
}

/// Convenience wrapper used by `main`: installs the SIGINT/SIGTERM handler
/// and runs the dispatcher to completion.
pub fn run_with_signal_handling(worker_count: usize) -> Result<(), DispatcherError> {
    let force_quit = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&force_quit);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .expect("failed to install SIGINT/SIGTERM handler");

    run(worker_count, force_quit)
}
