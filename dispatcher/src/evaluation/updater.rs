use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use model::{Model, WeightSet};
use tokio::{task, time};
use tokio_util::sync::CancellationToken;

use super::{Evaluator, WeightId, WeightSource};

/// What a single poll of the weight source did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The latest set is already active, staged or known to be broken.
    Unchanged,
    /// A new set was staged.
    Staged(WeightId),
    /// A new set failed to parse or validate and was remembered as broken.
    Rejected(WeightId),
    /// The source could not be read, the next poll tries again.
    Unavailable,
}

/// Polls a `WeightSource` and stages every newly published weight set into an `Evaluator`.
///
/// Reading, parsing and validating happen before the evaluator's lock is taken, which is only
/// held to drop the new set into the staged cell.
pub struct WeightUpdater<M: Model> {
    source: Box<dyn WeightSource>,
    evaluator: Arc<Evaluator<M>>,
    interval: Duration,
    rejected: Option<WeightId>,
}

impl<M: Model> WeightUpdater<M> {
    /// Creates a new `WeightUpdater`.
    ///
    /// # Arguments
    /// * `source` - Where new weight sets get published.
    /// * `evaluator` - The evaluator to stage new sets into.
    /// * `interval` - The time between polls.
    pub fn new(
        source: Box<dyn WeightSource>,
        evaluator: Arc<Evaluator<M>>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            evaluator,
            interval,
            rejected: None,
        }
    }

    /// Checks the source once and stages its latest set if it is new.
    ///
    /// Failures are logged and never reach the evaluator, the active set stays in place.
    pub fn poll(&mut self) -> PollOutcome {
        let id = match self.source.latest() {
            Ok(id) => id,
            Err(e) => {
                warn!("failed to read the latest weights identity: {e}");
                return PollOutcome::Unavailable;
            }
        };

        let known = Some(&id) == self.rejected.as_ref() || self.evaluator.is_current(&id);

        if known {
            debug!("weights {id} unchanged");
            return PollOutcome::Unchanged;
        }

        let text = match self.source.fetch(&id) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to fetch weights {id}: {e}");
                return PollOutcome::Unavailable;
            }
        };

        let staged = WeightSet::parse(&text)
            .map_err(Into::into)
            .and_then(|set| self.evaluator.stage_if_new(id.clone(), set));

        match staged {
            Ok(true) => {
                info!("staged weights {id}");
                PollOutcome::Staged(id)
            }
            Ok(false) => {
                debug!("weights {id} were staged meanwhile");
                PollOutcome::Unchanged
            }
            Err(e) => {
                warn!("weight swap error, discarding {id}: {e}");
                self.rejected = Some(id.clone());
                PollOutcome::Rejected(id)
            }
        }
    }

    /// Polls the source every interval until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    task::block_in_place(|| self.poll());
                }
            }
        }

        debug!("weight updater stopped");
    }
}
