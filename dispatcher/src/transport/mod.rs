mod datagram;
mod shm;
mod stream;

use model::Model;
use tokio_util::sync::CancellationToken;

pub use datagram::DatagramTransport;
pub use shm::SharedMemoryTransport;
pub use stream::StreamTransport;

use crate::{Result, storage::BatchHandle};

/// Moves requests from producers into a batch and the outputs back to them.
///
/// Every transport serves a single batch, one slot per client.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Serves requests until `shutdown` is cancelled.
    ///
    /// # Arguments
    /// * `batch` - The batch every request goes into.
    /// * `shutdown` - The cancellation token to stop serving.
    ///
    /// # Returns
    /// An error if the transport failed, errors of a single producer are handled inside.
    async fn serve<M: Model + 'static>(
        self,
        batch: BatchHandle<M>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}
