use std::sync::Arc;

use log::{debug, info};
use model::{Geometry, Model, WeightSet};
use ndarray::{Array2, ArrayView2};
use parking_lot::Mutex;

use super::WeightId;
use crate::{DispatchErr, Result};

#[derive(Debug)]
struct Weights {
    active: (WeightId, Arc<WeightSet>),
    staged: Option<(WeightId, Arc<WeightSet>)>,
}

/// Wraps the model together with the weight set it evaluates with.
///
/// Holds exactly one active weight set and at most one staged set. The staged set becomes
/// active at the start of the next evaluation, inside the same lock every evaluation takes
/// to grab its weights. An evaluation keeps its own reference to the set it started with, so
/// replacing the active set never affects a batch in flight, and the old set is freed once
/// the last batch using it finishes.
pub struct Evaluator<M: Model> {
    model: M,
    geometry: Geometry,
    weights: Mutex<Weights>,
}

impl<M: Model> Evaluator<M> {
    /// Creates a new `Evaluator`.
    ///
    /// # Arguments
    /// * `model` - The evaluation function.
    /// * `geometry` - The record and tensor dimensions.
    /// * `id` - The identity of the initial weight set.
    /// * `set` - The initial weight set.
    ///
    /// # Returns
    /// A new `Evaluator` or `InvalidWeightFormat` if `set` doesn't match `geometry`.
    pub fn new(model: M, geometry: Geometry, id: WeightId, set: WeightSet) -> Result<Self> {
        set.validate(&geometry)?;

        Ok(Self {
            model,
            geometry,
            weights: Mutex::new(Weights {
                active: (id, Arc::new(set)),
                staged: None,
            }),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn active_id(&self) -> WeightId {
        self.weights.lock().active.0.clone()
    }

    pub fn staged_id(&self) -> Option<WeightId> {
        self.weights.lock().staged.as_ref().map(|(id, _)| id.clone())
    }

    /// Leaves `set` to be adopted by the next evaluation, replacing any set staged before.
    ///
    /// # Returns
    /// `InvalidWeightFormat` if `set` doesn't match the geometry, in which case nothing is
    /// staged.
    pub fn stage(&self, id: WeightId, set: WeightSet) -> Result<()> {
        set.validate(&self.geometry)?;
        let set = Arc::new(set);

        self.weights.lock().staged = Some((id, set));
        Ok(())
    }

    /// Whether `id` is the active or the staged set.
    pub fn is_current(&self, id: &WeightId) -> bool {
        let weights = self.weights.lock();
        weights.active.0 == *id || weights.staged.as_ref().is_some_and(|(staged, _)| staged == id)
    }

    /// Stages `set` unless `id` is already active or staged, checked under the same lock the
    /// set is staged under.
    ///
    /// # Returns
    /// Whether `set` was staged, or `InvalidWeightFormat` if it doesn't match the geometry.
    pub fn stage_if_new(&self, id: WeightId, set: WeightSet) -> Result<bool> {
        set.validate(&self.geometry)?;
        let set = Arc::new(set);

        let mut weights = self.weights.lock();
        let current = weights.active.0 == id
            || weights.staged.as_ref().is_some_and(|(staged, _)| *staged == id);

        if current {
            return Ok(false);
        }

        weights.staged = Some((id, set));
        Ok(true)
    }

    /// Installs `set` as the active weight set right away, discarding any staged set.
    ///
    /// # Returns
    /// `InvalidWeightFormat` if `set` doesn't match the geometry, in which case the active
    /// set is kept.
    pub fn swap_weights(&self, id: WeightId, set: WeightSet) -> Result<()> {
        set.validate(&self.geometry)?;
        let set = Arc::new(set);

        let mut weights = self.weights.lock();
        info!("swapped weights {} for {id}", weights.active.0);
        weights.active = (id, set);
        weights.staged = None;

        Ok(())
    }

    /// Adopts the staged set, if any, and returns the set to evaluate with.
    fn begin_cycle(&self) -> Arc<WeightSet> {
        let mut weights = self.weights.lock();

        if let Some(staged) = weights.staged.take() {
            info!("adopted weights {} replacing {}", staged.0, weights.active.0);
            weights.active = staged;
        }

        Arc::clone(&weights.active.1)
    }

    /// Evaluates a batch with one input record per row.
    ///
    /// # Arguments
    /// * `batch` - The inputs.
    ///
    /// # Returns
    /// One output record per row or `OutputShape` if the model produced anything else.
    pub fn evaluate(&self, batch: ArrayView2<f32>) -> Result<Array2<f32>> {
        let weights = self.begin_cycle();
        let outputs = self.model.forward(&weights, batch);

        let expected = (batch.nrows(), self.geometry.output_len());
        if outputs.dim() != expected {
            return Err(DispatchErr::OutputShape {
                got: outputs.dim(),
                expected,
            });
        }

        debug!(rows = batch.nrows(); "evaluated batch");
        Ok(outputs)
    }
}
