use std::{env, fs::File, io, io::BufReader, time::Duration};

use comms::specs::DispatcherSpec;
use dispatcher::service::DispatcherBuilder;
use log::{info, warn};
use tokio::{runtime, signal, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

/// How long to wait for the shards to flush their partial batches once stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args().nth(1).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "usage: dispatcher <spec.json>")
    })?;

    let spec: DispatcherSpec = serde_json::from_reader(BufReader::new(File::open(&path)?))?;
    info!("loaded spec from {path}");

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    let result = runtime.block_on(run(spec));

    // Shared memory shards may be parked on a semaphore of a client that never comes back.
    runtime.shutdown_background();
    result
}

async fn run(spec: DispatcherSpec) -> io::Result<()> {
    let dispatcher = DispatcherBuilder::new().build(spec).await?;
    let shutdown = dispatcher.shutdown_token();
    let running = tokio::spawn(dispatcher.run());

    supervise(running, shutdown, signal::ctrl_c()).await
}

/// Waits for the shards to stop on their own or for `sigint`, then stops them.
///
/// If `sigint` can't be listened for the shards keep running until they stop by themselves.
async fn supervise(
    mut running: JoinHandle<dispatcher::Result<()>>,
    shutdown: CancellationToken,
    sigint: impl Future<Output = io::Result<()>>,
) -> io::Result<()> {
    tokio::select! {
        ret = &mut running => return ret.map_err(io::Error::other)?.map_err(Into::into),
        signal = sigint => match signal {
            Ok(()) => info!("received SIGINT, shutting down"),
            Err(e) => {
                warn!("failed to listen for SIGINT, running until the shards stop: {e}");
                return running.await.map_err(io::Error::other)?.map_err(Into::into);
            }
        },
    }

    shutdown.cancel();

    match time::timeout(SHUTDOWN_GRACE, running).await {
        Ok(ret) => ret.map_err(io::Error::other)?.map_err(Into::into),
        Err(_) => {
            warn!("shards did not stop within {SHUTDOWN_GRACE:?}, leaving them behind");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A stand in for the shards that stops once `shutdown` is cancelled.
    fn shards(shutdown: &CancellationToken) -> JoinHandle<dispatcher::Result<()>> {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            Ok(())
        })
    }

    #[tokio::test]
    async fn sigint_stops_the_shards() -> io::Result<()> {
        let shutdown = CancellationToken::new();
        let running = shards(&shutdown);

        supervise(running, shutdown.clone(), async { Ok(()) }).await?;
        assert!(shutdown.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn failed_sigint_listener_keeps_serving() -> io::Result<()> {
        let shutdown = CancellationToken::new();
        let running = tokio::spawn(async {
            time::sleep(Duration::from_millis(50)).await;
            Ok(())
        });

        let unavailable = async { Err(io::Error::other("no signal handling")) };
        supervise(running, shutdown.clone(), unavailable).await?;

        assert!(!shutdown.is_cancelled());
        Ok(())
    }
}
