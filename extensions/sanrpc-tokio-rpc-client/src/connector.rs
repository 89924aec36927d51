use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpSocket, TcpStream, lookup_host};

/// A bidirectional byte stream a client can run over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the byte stream behind a client.
///
/// Decorators such as TLS implement this by wrapping another connector and
/// returning the wrapped stream; the client only relies on read, write and
/// close.
#[async_trait::async_trait]
pub trait RpcConnector: Send + Sync {
    async fn connect(&self, network: &str, address: &str, timeout: Duration) -> io::Result<BoxedStream>;
}

/// Plain TCP, plus Unix sockets on Unix platforms.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    keepalive: bool,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self { keepalive: true }
    }
}

impl TcpConnector {
    pub fn new(keepalive: bool) -> Self {
        Self { keepalive }
    }

    /// Tries every resolved address in turn, returning the last failure.
    async fn connect_tcp(&self, address: &str) -> io::Result<TcpStream> {
        let mut last_err = None;

        for addr in lookup_host(address).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(self.keepalive)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("`{address}` did not resolve to any address"),
            )
        }))
    }
}

#[async_trait::async_trait]
impl RpcConnector for TcpConnector {
    async fn connect(&self, network: &str, address: &str, timeout: Duration) -> io::Result<BoxedStream> {
        let connect = async {
            match network {
                "tcp" | "tcp4" | "tcp6" => {
                    let stream: BoxedStream = Box::new(self.connect_tcp(address).await?);
                    Ok(stream)
                }
                #[cfg(unix)]
                "unix" => {
                    let stream: BoxedStream = Box::new(tokio::net::UnixStream::connect(address).await?);
                    Ok(stream)
                }
                other => Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("unsupported network `{other}`"),
                )),
            }
        };

        tokio::time::timeout(timeout, connect).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connecting to {network}@{address} timed out"),
            )
        })?
    }
}
