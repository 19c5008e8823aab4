//! Datagram I/O
//!
//! The protocol core never touches a socket. [`DatagramSocket`] is the seam
//! the connection's I/O helpers use; [`UdpTransport`] implements it over
//! `std::net::UdpSocket`.

pub mod udp;

pub use udp::UdpTransport;

use crate::error::Result;
use std::net::SocketAddr;
use std::time::Duration;

pub trait DatagramSocket {
    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> Result<usize>;

    /// Waits up to `timeout` for one datagram. `Ok(None)` on timeout.
    fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>>;

    fn local_addr(&self) -> Result<SocketAddr>;
}
