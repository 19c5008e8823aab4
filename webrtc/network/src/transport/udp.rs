//! UDP socket adapter

use super::DatagramSocket;
use crate::error::{NetworkError, Result};
use logging::Logger;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Blocking UDP socket with receive timeouts
pub struct UdpTransport {
    socket: UdpSocket,
    logger: Logger,
    bytes_sent: u64,
    bytes_received: u64,
}

impl UdpTransport {
    /// Binds a socket at `bind_addr`. Port 0 picks a free port.
    pub fn bind(bind_addr: SocketAddr, logger: Logger) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| NetworkError::Network(format!("Error binding {bind_addr}: {e}")))?;
        logger.info(&format!("UDP socket bound at {}", socket.local_addr()?));

        Ok(UdpTransport {
            socket,
            logger,
            bytes_sent: 0,
            bytes_received: 0,
        })
    }

    /// Returns (bytes_sent, bytes_received)
    pub fn stats(&self) -> (u64, u64) {
        (self.bytes_sent, self.bytes_received)
    }

    /// Releases the socket.
    pub fn close(self) {
        self.logger.info(&format!(
            "Closing UDP socket ({} bytes sent, {} received)",
            self.bytes_sent, self.bytes_received
        ));
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&mut self, data: &[u8], peer: SocketAddr) -> Result<usize> {
        let sent = self
            .socket
            .send_to(data, peer)
            .map_err(|e| NetworkError::Network(format!("Error sending to {peer}: {e}")))?;
        self.bytes_sent += sent as u64;
        self.logger
            .debug(&format!("Sent {sent} byte datagram to {peer}"));
        Ok(sent)
    }

    fn recv_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>> {
        // A zero timeout would mean "block forever" to the socket.
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket.set_read_timeout(Some(timeout))?;

        match self.socket.recv_from(buf) {
            Ok((size, addr)) => {
                self.bytes_received += size as u64;
                Ok(Some((size, addr)))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(NetworkError::Network(format!("Error receiving: {e}"))),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
