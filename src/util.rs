//! Socket setup for the agent transport.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Datagrams of the largest accepted size the kernel should hold per
/// direction before the agent drains them.
const BUFFERED_MESSAGES: usize = 64;

/// Bind the agent's UDP socket.
///
/// IPv6 addresses bind dual-stack. Both kernel buffers are sized for a
/// burst of `max_message_size` datagrams; the kernel may cap them at
/// `net.core.rmem_max` and `net.core.wmem_max`.
pub(crate) async fn bind_agent_socket(
    addr: SocketAddr,
    max_message_size: usize,
) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    // A restarted agent rebinds the port it just released.
    socket.set_reuse_address(true)?;

    let buffer = max_message_size.saturating_mul(BUFFERED_MESSAGES);
    if let Err(err) = socket.set_recv_buffer_size(buffer) {
        tracing::debug!(snmp.local_addr = %addr, error = %err, "receive buffer not resized");
    }
    if let Err(err) = socket.set_send_buffer_size(buffer) {
        tracing::debug!(snmp.local_addr = %addr, error = %err, "send buffer not resized");
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}
