mod datagram;
mod layout;
mod receiver;
mod sender;
pub mod shm;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use datagram::{Datagram, RecordSocket};
pub use layout::RecordLayout;
pub use receiver::RecordReceiver;
pub use sender::RecordSender;

/// Creates the dispatcher side of a stream channel.
///
/// The dispatcher reads fixed-size input records and writes fixed-size output records,
/// there is no length prefix on the wire, framing relies purely on the record sizes.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
/// * `layout` - The record sizes for both directions.
///
/// # Returns
/// A record receiver for inputs and a record sender for outputs.
pub fn server_channel<R, W>(
    rx: R,
    tx: W,
    layout: RecordLayout,
) -> (RecordReceiver<R>, RecordSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (
        RecordReceiver::new(rx, layout.input_len()),
        RecordSender::new(tx, layout.output_len()),
    )
}

/// Creates the worker side of a stream channel.
///
/// Mirror image of `server_channel`: reads outputs, writes inputs.
///
/// # Arguments
/// * `rx` - An async readable.
/// * `tx` - An async writable.
/// * `layout` - The record sizes for both directions.
///
/// # Returns
/// A record receiver for outputs and a record sender for inputs.
pub fn client_channel<R, W>(
    rx: R,
    tx: W,
    layout: RecordLayout,
) -> (RecordReceiver<R>, RecordSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (
        RecordReceiver::new(rx, layout.output_len()),
        RecordSender::new(tx, layout.input_len()),
    )
}
