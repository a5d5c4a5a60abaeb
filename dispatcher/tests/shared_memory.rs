mod common;

use std::{sync::mpsc, thread, time::Duration};

use comms::shm::{SharedRegion, ShmNames};
use dispatcher::transport::{SharedMemoryTransport, Transport};
use model::{Model, WeightSet};
use ndarray::{Array2, ArrayView2};
use tokio::{task, time};
use tokio_util::sync::CancellationToken;
use worker::{ClientErr, ShmClient};

use common::{LAYOUT, input, output, prefix};

const WAIT: Duration = Duration::from_secs(5);

fn evaluate(client: &mut ShmClient, value: f32) -> Vec<f32> {
    let mut out = vec![0.; LAYOUT.output_len()];
    client
        .evaluate(&input(value), &mut out)
        .expect("evaluation failed");
    out
}

#[test]
fn cycles_route_outputs_to_their_slots() -> dispatcher::Result<()> {
    const CLIENTS: usize = 3;
    const ROUNDS: usize = 4;

    let prefix = prefix("routing");
    let batch = common::handle(CLIENTS)?;
    let mut transport = SharedMemoryTransport::create(&prefix, CLIENTS, LAYOUT)?;

    let dispatcher = thread::spawn(move || -> dispatcher::Result<()> {
        transport.wait_ready()?;
        for _ in 0..ROUNDS {
            transport.serve_cycle(&*batch)?;
        }
        Ok(())
    });

    let clients: Vec<_> = (0..CLIENTS)
        .map(|_| {
            let prefix = prefix.clone();
            thread::spawn(move || {
                let mut client = ShmClient::register(&prefix, LAYOUT).expect("registration failed");
                let id = client.id();

                for round in 0..ROUNDS {
                    let value = (id * 10 + round) as f32;
                    assert_eq!(evaluate(&mut client, value), output(value));
                }

                id
            })
        })
        .collect();

    let mut ids: Vec<_> = clients
        .into_iter()
        .map(|client| client.join().expect("client panicked"))
        .collect();
    ids.sort_unstable();

    assert_eq!(ids, [0, 1, 2]);
    dispatcher.join().expect("dispatcher panicked")
}

#[test]
fn registration_past_capacity_fails() -> dispatcher::Result<()> {
    let prefix = prefix("capacity");
    let _transport = SharedMemoryTransport::create(&prefix, 1, LAYOUT)?;

    let first = ShmClient::register(&prefix, LAYOUT).expect("registration failed");
    assert_eq!(first.id(), 0);

    let second = ShmClient::register(&prefix, LAYOUT);
    assert!(matches!(second, Err(ClientErr::CapacityExceeded { capacity: 1 })));
    Ok(())
}

#[test]
fn the_slowest_client_gates_the_cycle() -> dispatcher::Result<()> {
    let prefix = prefix("stall");
    let batch = common::handle(2)?;
    let mut transport = SharedMemoryTransport::create(&prefix, 2, LAYOUT)?;

    let mut fast = ShmClient::register(&prefix, LAYOUT).expect("registration failed");
    let mut slow = ShmClient::register(&prefix, LAYOUT).expect("registration failed");

    let (done_tx, done_rx) = mpsc::channel();
    let dispatcher = thread::spawn(move || -> dispatcher::Result<()> {
        transport.wait_ready()?;
        transport.serve_cycle(&*batch)?;
        let _ = done_tx.send(());
        Ok(())
    });

    let fast = thread::spawn(move || evaluate(&mut fast, 1.));

    assert!(
        done_rx.recv_timeout(Duration::from_millis(200)).is_err(),
        "cycle completed without the slow client"
    );

    let other = common::prefix("stall_other");
    let other_batch = common::handle(1)?;
    let mut other_transport = SharedMemoryTransport::create(&other, 1, LAYOUT)?;
    let mut neighbour = ShmClient::register(&other, LAYOUT).expect("registration failed");

    let other_dispatcher = thread::spawn(move || -> dispatcher::Result<()> {
        other_transport.wait_ready()?;
        for _ in 0..3 {
            other_transport.serve_cycle(&*other_batch)?;
        }
        Ok(())
    });

    for round in 0..3 {
        assert_eq!(evaluate(&mut neighbour, round as f32), output(round as f32));
    }
    other_dispatcher.join().expect("dispatcher panicked")?;
    assert!(done_rx.try_recv().is_err(), "the stalled cycle completed early");

    assert_eq!(evaluate(&mut slow, 2.), output(2.));
    assert!(done_rx.recv_timeout(WAIT).is_ok());
    assert_eq!(fast.join().expect("client panicked"), output(1.));

    dispatcher.join().expect("dispatcher panicked")
}

/// Answers with a single column, never a valid output record.
struct Narrow;

impl Model for Narrow {
    fn forward(&self, _: &WeightSet, batch: ArrayView2<f32>) -> Array2<f32> {
        Array2::zeros((batch.nrows(), 1))
    }
}

#[test]
fn failed_batches_still_release_every_client() -> dispatcher::Result<()> {
    let prefix = prefix("narrow");
    let batch = common::handle_with(Narrow, 2)?;
    let mut transport = SharedMemoryTransport::create(&prefix, 2, LAYOUT)?;

    let mut first = ShmClient::register(&prefix, LAYOUT).expect("registration failed");
    let mut second = ShmClient::register(&prefix, LAYOUT).expect("registration failed");

    let dispatcher = thread::spawn(move || -> dispatcher::Result<()> {
        transport.wait_ready()?;
        transport.serve_cycle(&*batch)?;
        transport.serve_cycle(&*batch)
    });

    for round in 0..2 {
        let (tx, rx) = mpsc::channel();
        let value = round as f32;

        thread::scope(|s| {
            s.spawn(|| tx.send(evaluate(&mut first, value)));
            let _ = tx.send(evaluate(&mut second, value));
        });

        for _ in 0..2 {
            let out = rx.recv_timeout(WAIT).expect("client never released");
            assert!(out.iter().all(|v| v.is_nan()));
        }
    }

    dispatcher.join().expect("dispatcher panicked")
}

#[test]
fn failed_creation_leaves_nothing_behind() {
    // Short enough for the region, too long for the semaphore names.
    let mut prefix = prefix("cleanup");
    prefix.extend(std::iter::repeat_n('x', 250 - prefix.len()));

    assert!(SharedMemoryTransport::create(&prefix, 1, LAYOUT).is_err());

    let Err(e) = SharedRegion::open(&ShmNames::new(&prefix).region()) else {
        panic!("the region outlived the failed creation");
    };
    assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn missing_region_is_not_found() {
    let Err(ClientErr::Io(e)) = ShmClient::register(&prefix("missing"), LAYOUT) else {
        panic!("registered without a dispatcher");
    };

    assert_eq!(e.kind(), std::io::ErrorKind::NotFound);
}

#[tokio::test(flavor = "multi_thread")]
async fn serving_stops_after_the_cycle_in_flight() -> dispatcher::Result<()> {
    let prefix = prefix("shutdown");
    let batch = common::handle(2)?;
    let transport = SharedMemoryTransport::create(&prefix, 2, LAYOUT)?;

    let shutdown = CancellationToken::new();
    let serving = tokio::spawn(transport.serve(batch.clone(), shutdown.clone()));

    let register = || ShmClient::register(&prefix, LAYOUT).expect("registration failed");
    let (mut first, mut second) = (register(), register());

    let rounds = task::spawn_blocking(move || {
        for round in 0..2 {
            let a = thread::scope(|s| {
                let a = s.spawn(|| evaluate(&mut first, round as f32));
                assert_eq!(evaluate(&mut second, 10. + round as f32), output(10. + round as f32));
                a.join().expect("client panicked")
            });
            assert_eq!(a, output(round as f32));
        }
        (first, second)
    });
    let (mut first, mut second) = rounds.await.expect("clients panicked");

    let last = task::spawn_blocking(move || evaluate(&mut first, 5.));

    time::timeout(WAIT, async {
        while batch.filled() < 1 {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("last request never arrived");

    shutdown.cancel();

    let second = task::spawn_blocking(move || evaluate(&mut second, 6.));
    assert_eq!(second.await.expect("client panicked"), output(6.));
    assert_eq!(last.await.expect("client panicked"), output(5.));

    time::timeout(WAIT, serving)
        .await
        .expect("transport did not stop")
        .expect("transport panicked")?;

    assert_eq!(batch.cycle(), 3);
    Ok(())
}
