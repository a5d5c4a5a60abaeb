use std::{io, net::SocketAddr, sync::Arc};

use comms::RecordLayout;
use log::{error, info};
use model::Model;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::{
    DispatchErr, Result,
    evaluation::{Evaluator, WeightUpdater},
    storage::{BatchAssembler, BatchHandle},
    transport::{DatagramTransport, SharedMemoryTransport, StreamTransport, Transport},
};

/// One independent batch with its own transport.
pub enum Shard {
    SharedMemory(SharedMemoryTransport),
    Datagram(DatagramTransport),
    Stream(StreamTransport),
}

impl Shard {
    /// The socket address of the shard, `None` for shared memory.
    pub fn local_addr(&self) -> Result<Option<SocketAddr>> {
        match self {
            Shard::SharedMemory(_) => Ok(None),
            Shard::Datagram(transport) => transport.local_addr().map(Some),
            Shard::Stream(transport) => transport.local_addr().map(Some),
        }
    }
}

/// The central structure: every shard batches its own clients and all of them evaluate
/// through the same `Evaluator`, whose weights a single `WeightUpdater` keeps fresh.
pub struct Dispatcher<M: Model> {
    evaluator: Arc<Evaluator<M>>,
    updater: WeightUpdater<M>,
    shards: Vec<Shard>,
    batch_size: usize,
    layout: RecordLayout,
    shutdown: CancellationToken,
}

impl<M: Model + 'static> Dispatcher<M> {
    /// Creates a new `Dispatcher`.
    ///
    /// # Arguments
    /// * `evaluator` - The evaluator shared by every shard.
    /// * `updater` - The updater of the evaluator's weights.
    /// * `shards` - The bound transports, one per shard.
    /// * `batch_size` - The amount of clients per shard.
    /// * `layout` - The record sizes.
    pub fn new(
        evaluator: Arc<Evaluator<M>>,
        updater: WeightUpdater<M>,
        shards: Vec<Shard>,
        batch_size: usize,
        layout: RecordLayout,
    ) -> Self {
        Self {
            evaluator,
            updater,
            shards,
            batch_size,
            layout,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn evaluator(&self) -> Arc<Evaluator<M>> {
        Arc::clone(&self.evaluator)
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// The socket addresses of every socket shard, in shard order.
    pub fn local_addrs(&self) -> Result<Vec<SocketAddr>> {
        let mut addrs = Vec::new();

        for shard in &self.shards {
            addrs.extend(shard.local_addr()?);
        }

        Ok(addrs)
    }

    /// Returns a token that stops the dispatcher when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serves every shard until shutdown or until one of them fails.
    ///
    /// # Returns
    /// The first shard error, the rest of the shards are shut down when it happens.
    pub async fn run(self) -> Result<()> {
        let Self {
            evaluator,
            updater,
            shards,
            batch_size,
            layout,
            shutdown,
        } = self;

        let updater = tokio::spawn(updater.run(shutdown.clone()));
        let mut tasks = JoinSet::new();

        info!(shards = shards.len(), batch_size = batch_size; "dispatcher running");

        for shard in shards {
            let assembler = BatchAssembler::new(batch_size, layout, Arc::clone(&evaluator));
            let batch = BatchHandle::new(assembler);
            let shutdown = shutdown.clone();

            match shard {
                Shard::SharedMemory(transport) => tasks.spawn(transport.serve(batch, shutdown)),
                Shard::Datagram(transport) => tasks.spawn(transport.serve(batch, shutdown)),
                Shard::Stream(transport) => tasks.spawn(transport.serve(batch, shutdown)),
            };
        }

        let mut result = Ok(());

        while let Some(joined) = tasks.join_next().await {
            let joined = joined
                .map_err(|e| DispatchErr::Io(io::Error::other(e)))
                .and_then(|served| served);

            if let Err(e) = joined {
                error!("shard stopped: {e}");
                shutdown.cancel();

                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        shutdown.cancel();
        if let Err(e) = updater.await {
            error!("weight updater failed: {e}");
        }

        info!("dispatcher stopped");
        result
    }
}
