use std::{io, net::SocketAddr};

use tokio::net::{ToSocketAddrs, UdpSocket};

use crate::RecordLayout;

/// A datagram received by a `RecordSocket`.
#[derive(Debug, PartialEq)]
pub enum Datagram<'a> {
    /// A datagram of exactly one record.
    Record(&'a [f32]),
    /// A datagram whose payload size does not match the record size.
    Malformed { bytes: usize },
}

/// A udp socket exchanging fixed-size records, one record per datagram.
///
/// Datagrams carry no header, the payload is the record itself. Anything whose size is not
/// exactly one record is reported as `Datagram::Malformed`.
pub struct RecordSocket {
    socket: UdpSocket,
    buf: Vec<f32>,
    recv_len: usize,
    send_len: usize,
}

impl RecordSocket {
    /// Binds the dispatcher side socket, which receives inputs and sends outputs.
    ///
    /// # Arguments
    /// * `addr` - The address to bind to.
    /// * `layout` - The record sizes.
    ///
    /// # Returns
    /// The bound socket or an io error.
    pub async fn server<A: ToSocketAddrs>(addr: A, layout: RecordLayout) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, layout.input_len(), layout.output_len()))
    }

    /// Binds the worker side socket, which receives outputs and sends inputs.
    ///
    /// # Arguments
    /// * `addr` - The local address to bind to.
    /// * `layout` - The record sizes.
    ///
    /// # Returns
    /// The bound socket or an io error.
    pub async fn client<A: ToSocketAddrs>(addr: A, layout: RecordLayout) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::new(socket, layout.output_len(), layout.input_len()))
    }

    fn new(socket: UdpSocket, recv_len: usize, send_len: usize) -> Self {
        Self {
            socket,
            // One extra float so oversized datagrams are not silently truncated to a record.
            buf: vec![0.; recv_len + 1],
            recv_len,
            send_len,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Sets the default peer for `send` and `recv`.
    pub async fn connect<A: ToSocketAddrs>(&self, addr: A) -> io::Result<()> {
        self.socket.connect(addr).await
    }

    /// Waits for the next datagram.
    ///
    /// This method is cancel safe.
    ///
    /// # Returns
    /// The received datagram along with its origin address.
    pub async fn recv_from(&mut self) -> io::Result<(Datagram<'_>, SocketAddr)> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.buf.as_mut_slice());
        let (n, addr) = self.socket.recv_from(bytes).await?;
        Ok((self.classify(n), addr))
    }

    /// Waits for the next datagram from the connected peer.
    pub async fn recv(&mut self) -> io::Result<Datagram<'_>> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.buf.as_mut_slice());
        let n = self.socket.recv(bytes).await?;
        Ok(self.classify(n))
    }

    /// Sends `record` to `addr` as a single datagram.
    ///
    /// # Arguments
    /// * `record` - The record to send, must be exactly one record long.
    /// * `addr` - The destination address.
    pub async fn send_to(&self, record: &[f32], addr: SocketAddr) -> io::Result<()> {
        self.check_len(record)?;
        self.socket.send_to(bytemuck::cast_slice(record), addr).await?;
        Ok(())
    }

    /// Sends `record` to the connected peer.
    pub async fn send(&self, record: &[f32]) -> io::Result<()> {
        self.check_len(record)?;
        self.socket.send(bytemuck::cast_slice(record)).await?;
        Ok(())
    }

    fn classify(&self, n: usize) -> Datagram<'_> {
        if n == self.recv_len * size_of::<f32>() {
            Datagram::Record(&self.buf[..self.recv_len])
        } else {
            Datagram::Malformed { bytes: n }
        }
    }

    fn check_len(&self, record: &[f32]) -> io::Result<()> {
        if record.len() != self.send_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "record of {} floats does not match the expected {}",
                    record.len(),
                    self.send_len
                ),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: RecordLayout = RecordLayout::new(2, 3);

    #[tokio::test]
    async fn exchanges_records() -> io::Result<()> {
        let mut server = RecordSocket::server("127.0.0.1:0", LAYOUT).await?;
        let mut client = RecordSocket::client("127.0.0.1:0", LAYOUT).await?;
        client.connect(server.local_addr()?).await?;

        client.send(&[1.0, 2.0]).await?;

        let (datagram, addr) = server.recv_from().await?;
        assert_eq!(datagram, Datagram::Record(&[1.0, 2.0]));
        assert_eq!(addr, client.local_addr()?);

        server.send_to(&[3.0, 4.0, 5.0], addr).await?;
        assert_eq!(client.recv().await?, Datagram::Record(&[3.0, 4.0, 5.0]));
        Ok(())
    }

    #[tokio::test]
    async fn flags_wrong_sizes() -> io::Result<()> {
        let mut server = RecordSocket::server("127.0.0.1:0", LAYOUT).await?;
        let raw = UdpSocket::bind("127.0.0.1:0").await?;
        let target = server.local_addr()?;

        raw.send_to(&[0; 7], target).await?;
        let (datagram, _) = server.recv_from().await?;
        assert_eq!(datagram, Datagram::Malformed { bytes: 7 });

        raw.send_to(&[0; 64], target).await?;
        let (datagram, _) = server.recv_from().await?;
        assert!(matches!(datagram, Datagram::Malformed { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn rejects_wrong_length_sends() -> io::Result<()> {
        let server = RecordSocket::server("127.0.0.1:0", LAYOUT).await?;
        let addr = server.local_addr()?;

        let err = server.send_to(&[1.0], addr).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        Ok(())
    }
}
