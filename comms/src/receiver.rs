use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// The receiving end of a fixed-size record stream.
///
/// Owns a single record buffer which is reused for every record received.
pub struct RecordReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<f32>,
    filled: usize,
}

impl<R: AsyncRead + Unpin> RecordReceiver<R> {
    /// Creates a new `RecordReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    /// * `len` - The amount of floats in every record.
    pub(super) fn new(rx: R, len: usize) -> Self {
        Self {
            rx,
            buf: vec![0.; len],
            filled: 0,
        }
    }

    /// Returns the amount of floats in every record.
    pub fn record_len(&self) -> usize {
        self.buf.len()
    }

    /// Waits until a complete record is received.
    ///
    /// Partial reads accumulate inside the receiver, so this method is cancel safe: dropping
    /// the future halfway through a record keeps the bytes read so far for the next call.
    ///
    /// # Returns
    /// The received record, `None` if the peer closed the stream on a record boundary or
    /// an `UnexpectedEof` error if it closed it in the middle of a record.
    pub async fn recv(&mut self) -> io::Result<Option<&[f32]>> {
        let Self { rx, buf, filled } = self;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
        let size = bytes.len();

        while *filled < size {
            let n = rx.read(&mut bytes[*filled..]).await?;

            if n == 0 {
                if *filled == 0 {
                    return Ok(None);
                }

                let read = std::mem::take(filled);
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream closed after {read} of the {size} bytes of a record"),
                ));
            }

            *filled += n;
        }

        *filled = 0;
        Ok(Some(buf.as_slice()))
    }
}
