use std::io::Result;
use tokio::net::TcpListener;

/// Formats the listener's address as a node key, e.g. `tcp@127.0.0.1:8972`.
///
/// The result can be handed straight to `StaticDiscovery::parse`.
pub fn tcp_listener_to_node_key(listener: &TcpListener) -> Result<String> {
    Ok(format!("tcp@{}", listener.local_addr()?))
}

#[cfg(unix)]
pub fn unix_listener_to_node_key(listener: &tokio::net::UnixListener) -> Result<String> {
    let addr = listener.local_addr()?;
    let path = addr
        .as_pathname()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "unnamed unix socket"))?;
    Ok(format!("unix@{}", path.display()))
}
