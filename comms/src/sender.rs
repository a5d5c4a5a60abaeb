use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The sending end of a fixed-size record stream.
pub struct RecordSender<W: AsyncWrite + Unpin> {
    tx: W,
    len: usize,
}

impl<W: AsyncWrite + Unpin> RecordSender<W> {
    /// Creates a new `RecordSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    /// * `len` - The amount of floats in every record.
    pub(super) fn new(tx: W, len: usize) -> Self {
        Self { tx, len }
    }

    /// Returns the amount of floats in every record.
    pub fn record_len(&self) -> usize {
        self.len
    }

    /// Sends `record` through the inner writer.
    ///
    /// # Arguments
    /// * `record` - The record to send, must be exactly `record_len` floats long.
    ///
    /// # Returns
    /// An `InvalidInput` error if the record has the wrong size or the writer's error.
    pub async fn send(&mut self, record: &[f32]) -> io::Result<()> {
        if record.len() != self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "record of {} floats does not match the expected {}",
                    record.len(),
                    self.len
                ),
            ));
        }

        self.tx.write_all(bytemuck::cast_slice(record)).await?;
        self.tx.flush().await
    }

    /// Shuts down the write half of the inner writer.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
