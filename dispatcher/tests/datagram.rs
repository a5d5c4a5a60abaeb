mod common;

use std::{net::SocketAddr, time::Duration};

use dispatcher::transport::{DatagramTransport, Transport};
use tokio::{net::UdpSocket, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use worker::UdpClient;

use common::{LAYOUT, input, output};

const WAIT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(300);

type Serving = (SocketAddr, CancellationToken, JoinHandle<dispatcher::Result<()>>);

async fn serve(clients: usize) -> dispatcher::Result<Serving> {
    let batch = common::handle(clients)?;
    let transport = DatagramTransport::bind("127.0.0.1:0", clients, LAYOUT).await?;
    let addr = transport.local_addr()?;

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(transport.serve(batch, shutdown.clone()));
    Ok((addr, shutdown, serving))
}

async fn client(addr: SocketAddr) -> UdpClient {
    UdpClient::connect(addr, LAYOUT).await.expect("failed to bind client")
}

#[tokio::test(flavor = "multi_thread")]
async fn replies_reach_the_sender_of_each_request() -> dispatcher::Result<()> {
    let (addr, shutdown, serving) = serve(2).await?;
    let mut first = client(addr).await;
    let mut second = client(addr).await;

    for round in 0..3 {
        let (a, b) = (round as f32, 100. + round as f32);
        let (input_a, input_b) = (input(a), input(b));
        let (got_a, got_b) = time::timeout(WAIT, async {
            tokio::join!(first.evaluate(&input_a), second.evaluate(&input_b))
        })
        .await
        .expect("batch never completed");

        assert_eq!(got_a.expect("first client failed"), output(a));
        assert_eq!(got_b.expect("second client failed"), output(b));
    }

    shutdown.cancel();
    serving.await.expect("transport panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_datagrams_are_dropped() -> dispatcher::Result<()> {
    let (addr, shutdown, serving) = serve(1).await?;

    let raw = UdpSocket::bind("127.0.0.1:0").await?;
    raw.connect(addr).await?;
    raw.send(&[0; 5]).await?;

    let mut buf = [0; 64];
    let reply = time::timeout(SILENCE, raw.recv(&mut buf)).await;
    assert!(reply.is_err(), "malformed request got a reply");

    let mut good = client(addr).await;
    let got = time::timeout(WAIT, good.evaluate(&input(4.)))
        .await
        .expect("well formed request never answered")
        .expect("evaluation failed");
    assert_eq!(got, output(4.));

    shutdown.cancel();
    serving.await.expect("transport panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn senders_beyond_capacity_are_ignored() -> dispatcher::Result<()> {
    let (addr, shutdown, serving) = serve(1).await?;

    let mut first = client(addr).await;
    let got = time::timeout(WAIT, first.evaluate(&input(1.)))
        .await
        .expect("first request never answered")
        .expect("evaluation failed");
    assert_eq!(got, output(1.));

    let mut extra = client(addr).await;
    let reply = time::timeout(SILENCE, extra.evaluate(&input(2.))).await;
    assert!(reply.is_err(), "sender past capacity got a reply");

    shutdown.cancel();
    serving.await.expect("transport panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_requests_within_a_cycle_are_dropped() -> dispatcher::Result<()> {
    let batch = common::handle(2)?;
    let transport = DatagramTransport::bind("127.0.0.1:0", 2, LAYOUT).await?;
    let addr = transport.local_addr()?;

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(transport.serve(batch.clone(), shutdown.clone()));

    let raw = UdpSocket::bind("127.0.0.1:0").await?;
    raw.connect(addr).await?;
    raw.send(bytemuck::cast_slice(input(1.).as_slice())).await?;
    raw.send(bytemuck::cast_slice(input(2.).as_slice())).await?;

    time::timeout(WAIT, async {
        while batch.filled() < 1 {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first request never arrived");

    let mut second = client(addr).await;
    let got = time::timeout(WAIT, second.evaluate(&input(7.)))
        .await
        .expect("batch never completed")
        .expect("evaluation failed");
    assert_eq!(got, output(7.));

    let mut buf = vec![0_f32; LAYOUT.output_len()];
    let n = time::timeout(WAIT, raw.recv(bytemuck::cast_slice_mut(buf.as_mut_slice())))
        .await
        .expect("first sender never answered")?;
    assert_eq!(n, LAYOUT.output_bytes());
    assert_eq!(buf, output(1.));

    shutdown.cancel();
    serving.await.expect("transport panicked")
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_answers_the_partial_batch() -> dispatcher::Result<()> {
    let batch = common::handle(3)?;
    let transport = DatagramTransport::bind("127.0.0.1:0", 3, LAYOUT).await?;
    let addr = transport.local_addr()?;

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(transport.serve(batch.clone(), shutdown.clone()));

    let mut lone = client(addr).await;
    let pending = tokio::spawn(async move { lone.evaluate(&input(8.)).await });

    time::timeout(WAIT, async {
        while batch.filled() < 1 {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request never arrived");

    shutdown.cancel();

    let got = time::timeout(WAIT, pending)
        .await
        .expect("partial batch never answered")
        .expect("client panicked")
        .expect("evaluation failed");
    assert_eq!(got, output(8.));

    serving.await.expect("transport panicked")?;
    assert!(batch.is_closed());
    Ok(())
}
