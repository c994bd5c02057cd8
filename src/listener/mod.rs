//! TCP listener setup.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tracing::debug;

/// Bind a TCP listener with the socket options the proxy wants
/// (`SO_REUSEADDR`, non-blocking, a real accept backlog).
pub fn bind(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.set_nonblocking(true)?;

    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    debug!(%addr, "listener bound");

    TcpListener::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let local = listener.local_addr().unwrap();
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_bound_listener_accepts() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let connect = tokio::spawn(async move { tokio::net::TcpStream::connect(addr).await });
        let (stream, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), addr);
        assert_eq!(peer.ip(), addr.ip());
        connect.await.unwrap().unwrap();
    }
}
