use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use comms::{Datagram, RecordLayout, RecordSocket};

use crate::{ClientErr, Result};

/// A producer talking to a dispatcher over udp.
///
/// The dispatcher identifies clients by address, so a client keeps its socket for its whole
/// life.
pub struct UdpClient {
    socket: RecordSocket,
    layout: RecordLayout,
}

impl UdpClient {
    /// Binds an ephemeral local port and points it at the dispatcher at `server`.
    pub async fn connect(server: SocketAddr, layout: RecordLayout) -> Result<Self> {
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = RecordSocket::client(local, layout).await?;
        socket.connect(server).await?;

        Ok(Self { socket, layout })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Evaluates a single position.
    ///
    /// There are no retries, a lost datagram blocks this call forever.
    ///
    /// # Arguments
    /// * `input` - The input record.
    ///
    /// # Returns
    /// The output record or `MalformedResponse` if the reply has the wrong size.
    pub async fn evaluate(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.socket.send(input).await?;

        match self.socket.recv().await? {
            Datagram::Record(output) => Ok(output.to_vec()),
            Datagram::Malformed { bytes } => Err(ClientErr::MalformedResponse {
                got: bytes,
                expected: self.layout.output_bytes(),
            }),
        }
    }
}
