use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use comms::RecordLayout;
use log::{debug, info, warn};
use model::Model;
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    task::JoinSet,
    time,
};
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::{
    DispatchErr, Result,
    registry::{ClientId, ClientRegistry},
    storage::BatchHandle,
};

/// Serves clients over tcp, every connection is one client for as long as it stays open.
///
/// Requests and responses are raw fixed-size records with no framing header.
pub struct StreamTransport {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    layout: RecordLayout,
}

impl StreamTransport {
    /// Binds a new `StreamTransport`.
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
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            registry: Arc::new(ClientRegistry::new(clients)),
            layout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the registry of the connected clients.
    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }
}

/// Serves a single client until it disconnects or `shutdown` is cancelled.
///
/// The client id is released once the connection ends, however it ends.
async fn connection<M: Model>(
    stream: TcpStream,
    client: ClientId,
    layout: RecordLayout,
    batch: BatchHandle<M>,
    registry: Arc<ClientRegistry>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::server_channel(rx, tx, layout);
    let mut output = vec![0.; layout.output_len()];

    let result = loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            received = rx.recv() => received,
        };

        let record = match received {
            Ok(Some(record)) => record,
            Ok(None) => break Ok(()),
            Err(e) => break Err(DispatchErr::Io(e)),
        };

        match batch.offer(client, bytemuck::cast_slice(record), &mut output).await {
            Ok(()) => {}
            Err(DispatchErr::ShuttingDown) => break Ok(()),
            Err(e) => break Err(e),
        }

        if let Err(e) = tx.send(&output).await {
            break Err(DispatchErr::Io(e));
        }
    };

    registry.release(client)?;
    debug!(client_id = client; "client disconnected");
    result
}

impl Transport for StreamTransport {
    async fn serve<M: Model + 'static>(
        self,
        batch: BatchHandle<M>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let Self {
            listener,
            registry,
            layout,
        } = self;

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("failed to accept a connection: {e}");
                            if let Some(pause) = accept_backoff(&e) {
                                time::sleep(pause).await;
                            }
                            continue;
                        }
                    };

                    let client = match registry.register() {
                        Ok(client) => client,
                        Err(e) => {
                            warn!("refused connection from {addr}: {e}");
                            continue;
                        }
                    };

                    info!(client_id = client; "client connected from {addr}");
                    if registry.ready() == registry.capacity() {
                        info!("all {} clients connected", registry.capacity());
                    }

                    let task = connection(
                        stream,
                        client,
                        layout,
                        batch.clone(),
                        Arc::clone(&registry),
                        shutdown.clone(),
                    );
                    tasks.spawn(async move { (client, task.await) });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_connection_end(joined);
                }
            }
        }

        batch.flush().await?;

        while let Some(joined) = tasks.join_next().await {
            log_connection_end(joined);
        }

        Ok(())
    }
}

/// How long to stop accepting after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors tied to a single dying connection are retried right away, anything else, such as
/// running out of file descriptors, pauses the accept loop for a while.
fn accept_backoff(e: &io::Error) -> Option<Duration> {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted => None,
        _ => Some(ACCEPT_BACKOFF),
    }
}

type Joined = std::result::Result<(ClientId, Result<()>), tokio::task::JoinError>;

fn log_connection_end(joined: Joined) {
    match joined {
        Ok((_, Ok(()))) => {}
        Ok((client, Err(e))) => warn!("client {client} dropped: {e}"),
        Err(e) => warn!("connection task failed: {e}"),
    }
}
