use std::{env, io, net::SocketAddr};

use comms::RecordLayout;
use log::{debug, info};
use tokio::{net, task};

use worker::{ShmClient, TcpClient, UdpClient, geometry_from_env, parse_or};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PREFIX: &str = "lee";
const DEFAULT_ITERATIONS: usize = 1000;

async fn server_addr() -> io::Result<SocketAddr> {
    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT").map_err(io::Error::other)?;

    net::lookup_host(format!("{host}:{port}"))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))
}

/// Fills every input float with the iteration number.
fn position(input: &mut [f32], i: usize) {
    input.fill(i as f32);
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let geometry = geometry_from_env()?;
    let layout = RecordLayout::new(geometry.input_len(), geometry.output_len());
    let transport = env::var("TRANSPORT").unwrap_or_else(|_| "tcp".to_string());
    let iterations = parse_or(|key| env::var(key).ok(), "ITERATIONS", DEFAULT_ITERATIONS)?;

    let mut input = vec![0.; layout.input_len()];

    match transport.as_str() {
        "shm" => {
            let prefix = env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());

            task::spawn_blocking(move || {
                let mut client = ShmClient::register(&prefix, layout)?;
                let mut output = vec![0.; layout.output_len()];
                info!(client_id = client.id(); "registered at {prefix}");

                for i in 0..iterations {
                    position(&mut input, i);
                    client.evaluate(&input, &mut output)?;
                    debug!(iteration = i; "value {}", output[layout.output_len() - 1]);
                }

                Ok::<_, io::Error>(())
            })
            .await
            .map_err(io::Error::other)??;
        }
        "udp" => {
            let addr = server_addr().await?;
            let mut client = UdpClient::connect(addr, layout).await?;
            info!("sending datagrams to {addr} from {}", client.local_addr()?);

            for i in 0..iterations {
                position(&mut input, i);
                let output = client.evaluate(&input).await?;
                debug!(iteration = i; "value {}", output[layout.output_len() - 1]);
            }
        }
        "tcp" => {
            let addr = server_addr().await?;
            let mut client = TcpClient::connect(addr, layout).await?;
            info!("connected to {addr}");

            for i in 0..iterations {
                position(&mut input, i);
                let output = client.evaluate(&input).await?;
                debug!(iteration = i; "value {}", output[layout.output_len() - 1]);
            }
        }
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unknown TRANSPORT {other:?}, expected shm, udp or tcp"),
            ));
        }
    }

    info!("finished {iterations} evaluations");
    Ok(())
}
