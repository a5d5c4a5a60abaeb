use comms::{
    RecordLayout,
    shm::{self, RegionLayout, Semaphore, SharedRegion, ShmNames},
};
use log::{debug, info, warn};
use model::Model;
use tokio::task;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::{
    DispatchErr, Result,
    storage::{BatchAssembler, BatchHandle, Submission},
};

/// Serves clients living on the same machine through a shared memory region.
///
/// Client `k` writes its input slot and posts `B[k]`, then waits on `A[k]` to read its output
/// slot. Every cycle the dispatcher waits on all of `B` in order, evaluates, writes every
/// output slot and posts all of `A`. A client that dies without posting `B[k]` stalls the
/// dispatcher for good. A batch the model fails on is still answered, with NaN outputs.
pub struct SharedMemoryTransport {
    names: ShmNames,
    layout: RegionLayout,
    region: SharedRegion,
    _counter: Semaphore,
    input_ready: Vec<Semaphore>,
    output_ready: Vec<Semaphore>,
    input: Vec<u8>,
    output: Vec<f32>,
}

impl SharedMemoryTransport {
    /// Creates every shared object under `prefix` and opens registration.
    ///
    /// Stale objects with the same names are replaced. If any object can't be created, the
    /// ones created so far are unlinked again.
    ///
    /// # Arguments
    /// * `prefix` - The common name of the objects.
    /// * `clients` - The batch size.
    /// * `record` - The record sizes.
    ///
    /// # Returns
    /// The new transport or an io error if any object could not be created.
    pub fn create(prefix: &str, clients: usize, record: RecordLayout) -> Result<Self> {
        let names = ShmNames::new(prefix);

        let batch_size = u32::try_from(clients).map_err(|_| DispatchErr::InvalidBatchSize {
            batch_size: clients,
            instances: clients,
        })?;

        Self::create_objects(names.clone(), batch_size, record).inspect_err(|_| {
            if let Err(e) = shm::unlink_all(&names, clients) {
                warn!("failed to clean up shared memory objects {}: {e}", names.region());
            }
        })
    }

    fn create_objects(names: ShmNames, batch_size: u32, record: RecordLayout) -> Result<Self> {
        let clients = batch_size as usize;
        let layout = RegionLayout::new(clients, record);

        let region = SharedRegion::create(&names.region(), layout.size())?;
        region.write_u32(RegionLayout::NEXT_ID_OFFSET, 0)?;
        region.write_u32(RegionLayout::BATCH_SIZE_OFFSET, batch_size)?;

        let mut input_ready = Vec::with_capacity(clients);
        let mut output_ready = Vec::with_capacity(clients);

        for k in 0..clients {
            input_ready.push(Semaphore::create(&names.input_ready(k))?);
            output_ready.push(Semaphore::create(&names.output_ready(k))?);
        }

        let counter = Semaphore::create(&names.counter())?;
        counter.post()?;

        info!(
            clients = clients,
            bytes = layout.size();
            "shared memory region {} ready",
            names.region()
        );

        Ok(Self {
            names,
            layout,
            region,
            _counter: counter,
            input_ready,
            output_ready,
            input: vec![0; record.input_bytes()],
            output: vec![0.; record.output_len()],
        })
    }

    pub fn names(&self) -> &ShmNames {
        &self.names
    }

    /// Blocks until every client registered, each one posts its `B` once when it does.
    pub fn wait_ready(&self) -> Result<()> {
        for (k, sem) in self.input_ready.iter().enumerate() {
            sem.wait()?;
            debug!(client_id = k; "client connected");
        }

        Ok(())
    }

    /// Serves a single cycle: gathers every input, evaluates and scatters every output.
    ///
    /// # Arguments
    /// * `assembler` - The batch to gather the inputs into.
    pub fn serve_cycle<M: Model>(&mut self, assembler: &BatchAssembler<M>) -> Result<()> {
        let mut completed = None;

        for k in 0..self.layout.clients() {
            self.input_ready[k].wait()?;
            self.region.read(self.layout.input_offset(k), &mut self.input)?;

            if let Submission::Complete(batch) = assembler.submit(k, &self.input)? {
                completed = Some(batch);
            }
        }

        let Some(completed) = completed else {
            return Err(DispatchErr::ShuttingDown);
        };

        for k in 0..self.layout.clients() {
            completed.copy_output(k, &mut self.output)?;
            self.region
                .write_f32s(self.layout.output_offset(k), &self.output)?;
            self.output_ready[k].post()?;
        }

        Ok(())
    }

    /// Waits for every client and serves cycles until `shutdown` is cancelled.
    ///
    /// Cancellation is only noticed between cycles.
    pub fn serve_blocking<M: Model>(
        &mut self,
        assembler: &BatchAssembler<M>,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        self.wait_ready()?;
        info!("all {} clients connected", self.layout.clients());

        while !shutdown.is_cancelled() {
            self.serve_cycle(assembler)?;
        }

        Ok(())
    }
}

impl Transport for SharedMemoryTransport {
    async fn serve<M: Model + 'static>(
        mut self,
        batch: BatchHandle<M>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        task::block_in_place(|| self.serve_blocking(&*batch, &shutdown))
    }
}

impl Drop for SharedMemoryTransport {
    fn drop(&mut self) {
        if let Err(e) = shm::unlink_all(&self.names, self.layout.clients()) {
            warn!("failed to unlink shared memory objects {}: {e}", self.names.region());
        }
    }
}
