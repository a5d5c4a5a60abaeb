#![allow(dead_code)]

use std::{fs, io, path::Path, sync::Arc};

use comms::{
    RecordLayout,
    specs::{DispatcherSpec, GeometrySpec, TransportSpec, WeightSourceSpec},
};
use dispatcher::{
    evaluation::{BEST_NETWORK_POINTER, Evaluator, WeightId},
    storage::{BatchAssembler, BatchHandle},
};
use model::{Geometry, Model, WeightSet};
use ndarray::{Array2, ArrayView2};

/// Eight floats in, six floats out.
pub const GEOMETRY: Geometry = Geometry {
    input_planes: 2,
    board_size: 2,
    value_hidden: 1,
};

pub const LAYOUT: RecordLayout = RecordLayout::new(GEOMETRY.input_len(), GEOMETRY.output_len());

/// Answers every row with its first input plus the first parameter of the weights.
pub struct Tag;

impl Model for Tag {
    fn forward(&self, weights: &WeightSet, batch: ArrayView2<f32>) -> Array2<f32> {
        let offset = weights.tensors()[0][0];
        Array2::from_shape_fn((batch.nrows(), GEOMETRY.output_len()), |(i, _)| {
            batch[[i, 0]] + offset
        })
    }
}

pub fn weights(offset: f32) -> WeightSet {
    WeightSet::constant(&GEOMETRY, 1, 2, offset)
}

pub fn input(value: f32) -> Vec<f32> {
    vec![value; GEOMETRY.input_len()]
}

pub fn output(value: f32) -> Vec<f32> {
    vec![value; GEOMETRY.output_len()]
}

pub fn handle(clients: usize) -> dispatcher::Result<BatchHandle<Tag>> {
    handle_with(Tag, clients)
}

pub fn handle_with<M: Model>(model: M, clients: usize) -> dispatcher::Result<BatchHandle<M>> {
    let evaluator = Evaluator::new(model, GEOMETRY, WeightId::new("initial"), weights(0.))?;
    let assembler = BatchAssembler::new(clients, LAYOUT, Arc::new(evaluator));
    Ok(BatchHandle::new(assembler))
}

/// Publishes a weight set in a directory source layout.
pub fn publish(dir: &Path, hash: &str, contents: &str) -> io::Result<()> {
    fs::write(dir.join(format!("{hash}.txt")), contents)?;
    fs::write(dir.join(BEST_NETWORK_POINTER), hash)
}

pub fn spec(
    batch_size: usize,
    instances: Option<usize>,
    transport: TransportSpec,
    dir: &Path,
) -> DispatcherSpec {
    DispatcherSpec {
        batch_size: batch_size.try_into().expect("batch size must not be zero"),
        instances,
        transport,
        weights: WeightSourceSpec::Directory {
            path: dir.to_path_buf(),
        },
        poll_interval_secs: 1,
        geometry: GeometrySpec {
            input_planes: GEOMETRY.input_planes,
            board_size: GEOMETRY.board_size,
            value_hidden: GEOMETRY.value_hidden,
        },
    }
}

/// A unique shared memory prefix per test and process.
pub fn prefix(test: &str) -> String {
    format!("dispatcher_{test}_{}", std::process::id())
}
