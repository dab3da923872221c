//! TCP transport for the broker connection.
//!
//! # Example
//!
//! ```ignore
//! use c2sim_client::transport::connect_tcp;
//!
//! let (reader, writer) = connect_tcp("127.0.0.1:61613").await?;
//! client.connect(reader, writer).await?;
//! ```

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::Result;

/// Open a TCP connection and split it into read and write halves.
pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<(OwnedReadHalf, OwnedWriteHalf)> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    if let Ok(peer) = stream.peer_addr() {
        tracing::info!("Connected to broker at {}", peer);
    }
    Ok(stream.into_split())
}
