use std::{ops::Deref, sync::Arc};

use model::Model;
use tokio::task;

use super::{BatchAssembler, Completed, Submission};
use crate::{DispatchErr, Result, registry::ClientId};

/// The actual interface transports use to interact with a `BatchAssembler`.
///
/// It bridges the async runtime with the blocking CPU-bound evaluation of the `BatchAssembler`,
/// so it must be used from a multi threaded runtime.
pub struct BatchHandle<M: Model>(Arc<BatchAssembler<M>>);

impl<M: Model> Clone for BatchHandle<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M: Model> Deref for BatchHandle<M> {
    type Target = BatchAssembler<M>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<M: Model> BatchHandle<M> {
    /// Creates a new `BatchHandle`.
    ///
    /// # Arguments
    /// * `assembler` - The underlying batch assembler.
    ///
    /// # Returns
    /// A new `BatchHandle` instance.
    pub fn new(assembler: BatchAssembler<M>) -> Self {
        Self(Arc::new(assembler))
    }

    /// Async call to the synchronous implementation of `BatchAssembler::submit`.
    pub async fn submit(&self, client: ClientId, bytes: &[u8]) -> Result<Submission> {
        task::block_in_place(|| self.0.submit(client, bytes))
    }

    /// Async call to the synchronous implementation of `BatchAssembler::flush`.
    pub async fn flush(&self) -> Result<Option<Completed>> {
        task::block_in_place(|| self.0.flush())
    }

    /// Offers `client`'s input and waits until the batch it went into is evaluated.
    ///
    /// # Arguments
    /// * `client` - The submitting client.
    /// * `bytes` - The raw input record.
    /// * `out` - Where `client`'s output record will be written to.
    ///
    /// # Returns
    /// The error that rejected the input or failed the batch.
    pub async fn offer(&self, client: ClientId, bytes: &[u8], out: &mut [f32]) -> Result<()> {
        let mut done = self.0.subscribe();

        let cycle = match self.submit(client, bytes).await? {
            Submission::Complete(completed) => return completed.copy_output(client, out),
            Submission::Pending { cycle } => cycle,
        };

        done.wait_for(|&completed| completed > cycle)
            .await
            .map_err(|_| DispatchErr::ShuttingDown)?;

        self.0.output(cycle, client, out)
    }
}
