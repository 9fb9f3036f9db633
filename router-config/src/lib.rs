//! CLI parsing (`clap`) and the typed, immutable configuration structs the
//! dispatcher builds the FIB and interface set from. Mirrors the split
//! between the teacher's `dataplane-args` (parsing) and `dataplane-config`
//! (typed model) crates, scaled down to this router's actual surface.

use std::net::Ipv4Addr;
use std::str::FromStr;

use clap::Parser;
use router_net::mac::MacParseError;
use router_net::MacAddr;
use thiserror::Error;

/// `-p <iface>,<ipv4>` before the owned MAC is known — the packet-I/O
/// substrate supplies that once the device is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub id: u8,
    pub ip: Ipv4Addr,
}

/// A fully resolved interface, ready for the FIB/worker to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub id: u8,
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

impl InterfaceConfig {
    #[must_use]
    pub fn new(spec: InterfaceSpec, mac: MacAddr) -> Self {
        InterfaceConfig {
            id: spec.id,
            ip: spec.ip,
            mac,
        }
    }
}

/// `-r <ipv4>/<cidr>,<mac>,<iface>` — a route waiting to be fed into the
/// FIB builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRoute {
    pub prefix_ip: Ipv4Addr,
    pub prefix_len: u8,
    pub mac: MacAddr,
    pub iface: u8,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed -p spec '{0}', expected <iface>,<ipv4>")]
    BadInterfaceSpec(String),
    #[error("malformed -r spec '{0}', expected <ipv4>/<cidr>,<mac>,<iface>")]
    BadRouteSpec(String),
    #[error("invalid interface id '{0}'")]
    BadInterfaceId(String),
    #[error("invalid ipv4 address '{0}'")]
    BadIpv4(String),
    #[error("invalid cidr length '{0}', expected 0..=32")]
    BadCidr(String),
    #[error("invalid mac address: {0}")]
    BadMac(#[from] MacParseError),
    #[error("command line usage error: {0}")]
    Usage(String),
}

fn parse_interface_spec(s: &str) -> Result<InterfaceSpec, ConfigError> {
    let (id_str, ip_str) = s
        .split_once(',')
        .ok_or_else(|| ConfigError::BadInterfaceSpec(s.to_string()))?;
    let id = id_str
        .parse::<u8>()
        .map_err(|_| ConfigError::BadInterfaceId(id_str.to_string()))?;
    let ip = Ipv4Addr::from_str(ip_str).map_err(|_| ConfigError::BadIpv4(ip_str.to_string()))?;
    Ok(InterfaceSpec { id, ip })
}

fn parse_route_spec(s: &str) -> Result<PendingRoute, ConfigError> {
    let mut parts = s.splitn(3, ',');
    let cidr_str = parts
        .next()
        .ok_or_else(|| ConfigError::BadRouteSpec(s.to_string()))?;
    let mac_str = parts
        .next()
        .ok_or_else(|| ConfigError::BadRouteSpec(s.to_string()))?;
    let iface_str = parts
        .next()
        .ok_or_else(|| ConfigError::BadRouteSpec(s.to_string()))?;

    let (ip_str, len_str) = cidr_str
        .split_once('/')
        .ok_or_else(|| ConfigError::BadRouteSpec(s.to_string()))?;
    let prefix_ip =
        Ipv4Addr::from_str(ip_str).map_err(|_| ConfigError::BadIpv4(ip_str.to_string()))?;
    let prefix_len = len_str
        .parse::<u8>()
        .ok()
        .filter(|len| *len <= 32)
        .ok_or_else(|| ConfigError::BadCidr(len_str.to_string()))?;
    let mac = MacAddr::from_str(mac_str)?;
    let iface = iface_str
        .parse::<u8>()
        .map_err(|_| ConfigError::BadInterfaceId(iface_str.to_string()))?;

    Ok(PendingRoute {
        prefix_ip,
        prefix_len,
        mac,
        iface,
    })
}

/// The router's command-line surface: repeatable `-p` and `-r` options,
/// parsed and validated eagerly so the dispatcher only ever sees typed
/// values.
#[derive(Debug, Parser)]
#[command(name = "router", about = "Poll-mode IPv4 router")]
pub struct Cli {
    /// Attach an interface: `<iface>,<ipv4>`. Repeatable.
    #[arg(short = 'p', value_parser = parse_interface_spec)]
    pub interfaces: Vec<InterfaceSpec>,

    /// Install a route: `<ipv4>/<cidr>,<mac>,<iface>`. Repeatable.
    #[arg(short = 'r', value_parser = parse_route_spec)]
    pub routes: Vec<PendingRoute>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_interface_spec() {
        let spec = parse_interface_spec("0,10.0.10.1").unwrap();
        assert_eq!(spec.id, 0);
        assert_eq!(spec.ip, Ipv4Addr::new(10, 0, 10, 1));
    }

    #[test]
    fn rejects_malformed_interface_spec() {
        assert!(parse_interface_spec("not-a-spec").is_err());
        assert!(parse_interface_spec("256,10.0.10.1").is_err());
        assert!(parse_interface_spec("0,not-an-ip").is_err());
    }

    #[test]
    fn parses_route_spec() {
        let route = parse_route_spec("10.0.10.0/24,aa:aa:aa:aa:aa:aa,0").unwrap();
        assert_eq!(route.prefix_ip, Ipv4Addr::new(10, 0, 10, 0));
        assert_eq!(route.prefix_len, 24);
        assert_eq!(route.mac, MacAddr([0xaa; 6]));
        assert_eq!(route.iface, 0);
    }

    #[test]
    fn rejects_cidr_out_of_range() {
        assert!(matches!(
            parse_route_spec("10.0.10.0/33,aa:aa:aa:aa:aa:aa,0"),
            Err(ConfigError::BadCidr(_))
        ));
    }

    #[test]
    fn rejects_malformed_route_spec() {
        assert!(parse_route_spec("10.0.10.0/24,aa:aa:aa:aa:aa:aa").is_err());
        assert!(parse_route_spec("not-a-cidr,aa:aa:aa:aa:aa:aa,0").is_err());
    }

    #[test]
    fn cli_parses_repeated_flags() {
        let cli = Cli::parse_from([
            "router",
            "-p",
            "0,10.0.10.1",
            "-p",
            "1,10.0.20.1",
            "-r",
            "10.0.10.0/24,aa:aa:aa:aa:aa:aa,0",
        ]);
        assert_eq!(cli.interfaces.len(), 2);
        assert_eq!(cli.routes.len(), 1);
    }
}
