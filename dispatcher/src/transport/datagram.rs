use std::net::SocketAddr;

use comms::{Datagram, RecordLayout, RecordSocket};
use log::{debug, info, warn};
use model::Model;
use tokio::net::ToSocketAddrs;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::{
    DispatchErr, Result,
    registry::{ClientId, ClientRegistry},
    storage::{BatchHandle, Completed, Submission},
};

/// Serves clients over udp, one request or response per datagram.
///
/// A sender's address is its identity: the first datagram from an unknown address takes the
/// next free client id and the address is remembered in that id's slot. This only works
/// with exactly as many distinct senders as slots.
pub struct DatagramTransport {
    socket: RecordSocket,
    registry: ClientRegistry,
    peers: Vec<Option<SocketAddr>>,
    output: Vec<f32>,
}

impl DatagramTransport {
    /// Binds a new `DatagramTransport`.
    ///
    /// # Arguments
    /// * `addr` - The address to listen on.
    /// * `clients` - The batch size.
    /// * `layout` - The record sizes.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        clients: usize,
        layout: RecordLayout,
    ) -> Result<Self> {
        let socket = RecordSocket::server(addr, layout).await?;

        Ok(Self {
            socket,
            registry: ClientRegistry::untracked(clients),
            peers: vec![None; clients],
            output: vec![0.; layout.output_len()],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Finds the client id of `addr`, registering it if it is new.
    fn client_of(
        registry: &ClientRegistry,
        peers: &mut [Option<SocketAddr>],
        addr: SocketAddr,
    ) -> Result<ClientId> {
        if let Some(id) = peers.iter().position(|peer| *peer == Some(addr)) {
            return Ok(id);
        }

        let id = registry.register()?;
        peers[id] = Some(addr);
        debug!(client_id = id; "new client at {addr}");

        if peers.iter().all(Option::is_some) {
            info!("all {} clients known", peers.len());
        }

        Ok(id)
    }

    /// Sends every output of `completed` back to its client.
    async fn reply(&mut self, completed: &Completed) {
        let Self {
            socket,
            peers,
            output,
            ..
        } = self;

        for &client in &completed.clients {
            let Some(addr) = peers[client] else {
                continue;
            };

            if let Err(e) = completed.copy_output(client, output) {
                warn!("no reply for client {client}: {e}");
                continue;
            }

            if let Err(e) = socket.send_to(output, addr).await {
                warn!("failed to reply to client {client} at {addr}: {e}");
            }
        }
    }
}

impl Transport for DatagramTransport {
    async fn serve<M: Model + 'static>(
        mut self,
        batch: BatchHandle<M>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let Self {
                socket,
                registry,
                peers,
                ..
            } = &mut self;

            let (datagram, addr) = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = socket.recv_from() => received?,
            };

            let record = match datagram {
                Datagram::Record(record) => record,
                Datagram::Malformed { bytes } => {
                    let expected = batch.layout().input_bytes();
                    warn!("dropped malformed request from {addr}: {bytes} of {expected} bytes");
                    continue;
                }
            };

            let client = match Self::client_of(registry, peers, addr) {
                Ok(client) => client,
                Err(e) => {
                    warn!("dropped request from {addr}: {e}");
                    continue;
                }
            };

            let completed = match batch.submit(client, bytemuck::cast_slice(record)).await {
                Ok(Submission::Pending { .. }) => continue,
                Ok(Submission::Complete(completed)) => completed,
                Err(DispatchErr::ShuttingDown) => break,
                Err(e @ DispatchErr::DuplicateOffer { .. }) => {
                    warn!("dropped request from {addr}: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.reply(&completed).await;
        }

        if let Some(completed) = batch.flush().await? {
            debug!(clients = completed.clients.len(); "replying to a partial batch");
            self.reply(&completed).await;
        }

        Ok(())
    }
}
