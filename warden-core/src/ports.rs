//! OS-level free-port probe

use std::collections::HashSet;
use std::net::{IpAddr, TcpListener, UdpSocket};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// First port a worker tries when it bootstraps its own listener
pub const DEFAULT_WORKER_PORT_BASE: u16 = 3600;

/// Whether both a TCP listener and a UDP socket can bind `host:port` right now
pub fn is_port_free(host: IpAddr, port: u16) -> bool {
    if port == 0 {
        return false;
    }
    TcpListener::bind((host, port)).is_ok() && UdpSocket::bind((host, port)).is_ok()
}

/// Scan upwards from `start_from` for the first free port
pub fn find_free_port(host: IpAddr, start_from: u16) -> CoreResult<u16> {
    find_free_port_excluding(host, start_from, &HashSet::new())
}

/// Scan upwards from `start_from`, skipping ports in `excluded` even if the OS
/// reports them free (e.g. handed out but not bound yet).
pub fn find_free_port_excluding(
    host: IpAddr,
    start_from: u16,
    excluded: &HashSet<u16>,
) -> CoreResult<u16> {
    let start = start_from.max(1);

    for port in start..=u16::MAX {
        if excluded.contains(&port) {
            continue;
        }
        if is_port_free(host, port) {
            debug!("Found free port {} (scan started at {})", port, start);
            return Ok(port);
        }
    }

    Err(CoreError::NoFreePort { start_from })
}
