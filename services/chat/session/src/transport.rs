//! TCP transport helpers for chat sessions.
//!
//! Sessions themselves are generic over any `AsyncRead + AsyncWrite`
//! stream; these helpers cover the common TCP case.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Bind a listener for inbound chat connections.
pub async fn listen_chat(addr: SocketAddr) -> tokio::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Dial a chat server.
pub async fn connect_chat(addr: SocketAddr) -> tokio::io::Result<TcpStream> {
    TcpStream::connect(addr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_listen_connect() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let listener = listen_chat(addr).await.unwrap();
        let bound_addr = listener.local_addr().unwrap();

        let stream = connect_chat(bound_addr).await.unwrap();
        assert!(stream.peer_addr().is_ok());
    }
}
