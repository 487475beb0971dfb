// Shared listener module
// Creates the listening socket every worker accepts from

use socket2::{Domain, Protocol, Socket, Type};

/// Create a non-blocking listening socket with `SO_REUSEADDR` enabled.
///
/// The returned std listener is cloned into each worker, which registers
/// its clone with its own runtime.
///
/// # Arguments
///
/// * `addr` - The socket address to bind to
/// * `backlog` - Accept queue length
pub fn create_shared_listener(
    addr: std::net::SocketAddr,
    backlog: usize,
) -> std::io::Result<std::net::TcpListener> {
    // Create socket with appropriate domain (IPv4 or IPv6)
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Enable SO_REUSEADDR: allows binding to a port in TIME_WAIT state
    socket.set_reuse_address(true)?;

    // Set non-blocking mode for async compatibility
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;

    Ok(socket.into())
}
