use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use comms::{
    RecordLayout,
    specs::{DispatcherSpec, GeometrySpec, TransportSpec, WeightSourceSpec},
};
use log::info;
use model::{Geometry, Model, UniformModel};

use super::{Dispatcher, Shard};
use crate::{
    DispatchErr, Result,
    evaluation::{DirectorySource, Evaluator, FileSource, WeightSource, WeightUpdater, load_weights},
    transport::{DatagramTransport, SharedMemoryTransport, StreamTransport},
};

/// Returns the amount of shards needed to serve `instances` producers in batches of
/// `batch_size`.
///
/// # Returns
/// The amount of shards or `InvalidBatchSize` if `batch_size` is zero or doesn't divide
/// `instances`.
pub fn shard_count(batch_size: usize, instances: usize) -> Result<usize> {
    if batch_size == 0 || instances == 0 || instances % batch_size != 0 {
        return Err(DispatchErr::InvalidBatchSize {
            batch_size,
            instances,
        });
    }

    Ok(instances / batch_size)
}

/// Builds `Dispatcher`s given a specification.
pub struct DispatcherBuilder;

impl DispatcherBuilder {
    /// Creates a new `DispatcherBuilder`.
    ///
    /// # Returns
    /// A new `DispatcherBuilder` instance.
    pub fn new() -> Self {
        Self
    }

    /// Builds a new `Dispatcher` serving the placeholder `UniformModel`.
    ///
    /// # Arguments
    /// * `spec` - The specification of the dispatcher.
    ///
    /// # Returns
    /// A new dispatcher with every transport bound, or the startup error.
    pub async fn build(&self, spec: DispatcherSpec) -> Result<Dispatcher<UniformModel>> {
        let model = UniformModel::new(self.resolve_geometry(&spec.geometry));
        self.build_with_model(spec, model).await
    }

    /// Builds a new `Dispatcher` serving `model`.
    ///
    /// # Arguments
    /// * `spec` - The specification of the dispatcher.
    /// * `model` - The evaluation function.
    ///
    /// # Returns
    /// A new dispatcher with every transport bound, or the startup error: an invalid batch
    /// size, an unreadable or invalid weight file or a transport that failed to bind.
    pub async fn build_with_model<M: Model + 'static>(
        &self,
        spec: DispatcherSpec,
        model: M,
    ) -> Result<Dispatcher<M>> {
        let batch_size = spec.batch_size.get();
        let shards = shard_count(batch_size, spec.instances.unwrap_or(batch_size))?;

        let geometry = self.resolve_geometry(&spec.geometry);
        let layout = RecordLayout::new(geometry.input_len(), geometry.output_len());

        let source = self.resolve_weight_source(&spec.weights);
        let (id, set) = load_weights(source.as_ref(), &geometry)?;
        info!(blocks = set.blocks(), filters = set.filters(); "loaded weights {id}");

        let evaluator = Arc::new(Evaluator::new(model, geometry, id, set)?);
        let interval = Duration::from_secs(spec.poll_interval_secs);
        let updater = WeightUpdater::new(source, Arc::clone(&evaluator), interval);

        let mut bound = Vec::with_capacity(shards);
        for shard in 0..shards {
            let transport = self
                .resolve_transport(&spec.transport, shard, shards, batch_size, layout)
                .await?;
            bound.push(transport);
        }

        Ok(Dispatcher::new(evaluator, updater, bound, batch_size, layout))
    }

    fn resolve_geometry(&self, spec: &GeometrySpec) -> Geometry {
        Geometry {
            input_planes: spec.input_planes,
            board_size: spec.board_size,
            value_hidden: spec.value_hidden,
        }
    }

    fn resolve_weight_source(&self, spec: &WeightSourceSpec) -> Box<dyn WeightSource> {
        match spec {
            WeightSourceSpec::File { path } => Box::new(FileSource::new(path)),
            WeightSourceSpec::Directory { path } => Box::new(DirectorySource::new(path)),
        }
    }

    /// Binds the transport of a single shard.
    ///
    /// A lone shard uses the configured prefix or address as is, otherwise shard `i` appends
    /// `_i` to the prefix or adds `i` to the port.
    async fn resolve_transport(
        &self,
        spec: &TransportSpec,
        shard: usize,
        shards: usize,
        batch_size: usize,
        layout: RecordLayout,
    ) -> Result<Shard> {
        match spec {
            TransportSpec::SharedMemory { prefix } => {
                let prefix = match shards {
                    1 => prefix.clone(),
                    _ => format!("{prefix}_{shard}"),
                };

                let transport = SharedMemoryTransport::create(&prefix, batch_size, layout)?;
                Ok(Shard::SharedMemory(transport))
            }
            TransportSpec::Udp { addr } => {
                let addr = shard_addr(*addr, shard)?;
                let transport = DatagramTransport::bind(addr, batch_size, layout).await?;
                info!("shard {shard} listening for datagrams at {}", transport.local_addr()?);
                Ok(Shard::Datagram(transport))
            }
            TransportSpec::Tcp { addr } => {
                let addr = shard_addr(*addr, shard)?;
                let transport = StreamTransport::bind(addr, batch_size, layout).await?;
                info!("shard {shard} listening for connections at {}", transport.local_addr()?);
                Ok(Shard::Stream(transport))
            }
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Offsets the port of `addr` by `shard`, port zero stays zero so every shard gets its own
/// ephemeral port.
fn shard_addr(mut addr: SocketAddr, shard: usize) -> Result<SocketAddr> {
    if addr.port() == 0 {
        return Ok(addr);
    }

    let port = u16::try_from(shard)
        .ok()
        .and_then(|shard| addr.port().checked_add(shard))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no port left for shard {shard} after {addr}"),
            )
        })?;

    addr.set_port(port);
    Ok(addr)
}
