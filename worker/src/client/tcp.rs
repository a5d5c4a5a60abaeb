use std::io;

use comms::{RecordLayout, RecordReceiver, RecordSender};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};

use crate::Result;

/// A producer connected to a dispatcher over tcp.
pub struct TcpClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    rx: RecordReceiver<R>,
    tx: RecordSender<W>,
}

impl TcpClient<OwnedReadHalf, OwnedWriteHalf> {
    /// Connects to the dispatcher listening at `addr`.
    pub async fn connect<A: ToSocketAddrs>(addr: A, layout: RecordLayout) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        Ok(Self::new(rx, tx, layout))
    }
}

impl<R, W> TcpClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new `TcpClient` over an already established stream.
    ///
    /// # Arguments
    /// * `rx` - The reading half.
    /// * `tx` - The writing half.
    /// * `layout` - The record sizes.
    pub fn new(rx: R, tx: W, layout: RecordLayout) -> Self {
        let (rx, tx) = comms::client_channel(rx, tx, layout);
        Self { rx, tx }
    }

    /// Evaluates a single position.
    ///
    /// # Arguments
    /// * `input` - The input record.
    ///
    /// # Returns
    /// The output record, or an `UnexpectedEof` io error if the dispatcher hung up, which
    /// is also how it refuses a client past its capacity.
    pub async fn evaluate(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.tx.send(input).await?;

        match self.rx.recv().await? {
            Some(output) => Ok(output.to_vec()),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "the dispatcher closed the connection",
            )
            .into()),
        }
    }
}
