use ndarray::{Array2, ArrayView2};

use crate::{Geometry, WeightSet};

/// The network evaluation function.
///
/// Given a weight set and a batch with one input record per row, produces a batch with one
/// output record per row. Implementations must be deterministic for a given weight set.
pub trait Model: Send + Sync {
    /// Evaluates a whole batch.
    ///
    /// # Arguments
    /// * `weights` - The weight set to evaluate with.
    /// * `batch` - The batch of inputs, one row per client.
    ///
    /// # Returns
    /// The batch of outputs, one row per client in the same order.
    fn forward(&self, weights: &WeightSet, batch: ArrayView2<f32>) -> Array2<f32>;
}

/// A placeholder model answering every position with a uniform policy and an even value.
#[derive(Debug, Clone, Copy)]
pub struct UniformModel {
    geometry: Geometry,
}

impl UniformModel {
    pub fn new(geometry: Geometry) -> Self {
        Self { geometry }
    }
}

impl Model for UniformModel {
    fn forward(&self, _weights: &WeightSet, batch: ArrayView2<f32>) -> Array2<f32> {
        let policy_len = self.geometry.policy_len();
        let p = 1. / policy_len as f32;

        Array2::from_shape_fn((batch.nrows(), self.geometry.output_len()), |(_, j)| {
            if j < policy_len { p } else { 0. }
        })
    }
}
