use std::sync::Arc;

use comms::RecordLayout;
use log::{debug, error};
use model::Model;
use ndarray::{Array2, ArrayView1};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::watch;

use super::{Fill, SlotBuffer};
use crate::{DispatchErr, Result, evaluation::Evaluator, registry::ClientId};

/// An evaluated batch.
#[derive(Debug)]
pub struct Completed {
    pub cycle: u64,
    /// The clients that submitted to this batch, in ascending order.
    pub clients: Vec<ClientId>,
    /// One output row per slot, indexed by client id.
    pub outputs: Array2<f32>,
}

impl Completed {
    /// The output record of `client`.
    pub fn output(&self, client: ClientId) -> ArrayView1<'_, f32> {
        self.outputs.row(client)
    }

    /// Copies the output record of `client` into `out`.
    ///
    /// # Returns
    /// `OutputShape` if `out` doesn't have the length of an output record.
    pub fn copy_output(&self, client: ClientId, out: &mut [f32]) -> Result<()> {
        copy_row(self.output(client), out)
    }
}

fn copy_row(row: ArrayView1<'_, f32>, out: &mut [f32]) -> Result<()> {
    if row.len() != out.len() {
        return Err(DispatchErr::OutputShape {
            got: (1, out.len()),
            expected: (1, row.len()),
        });
    }

    for (dst, src) in out.iter_mut().zip(row) {
        *dst = *src;
    }

    Ok(())
}

/// The result of submitting an input.
#[derive(Debug)]
pub enum Submission {
    /// The batch is still filling up, the output will be ready once `cycle` completes.
    Pending { cycle: u64 },
    /// This submission filled the batch, which was evaluated on the spot.
    Complete(Completed),
}

#[derive(Debug)]
struct AssemblerState {
    slots: SlotBuffer,
    cycle: u64,
    closed: bool,
}

/// Collects exactly one input per client and evaluates them together.
///
/// The submission that fills the last slot runs the evaluation synchronously and every other
/// submitter of that cycle waits for it, so the slowest client gates the batch. Cycles are
/// numbered from zero, the amount of completed cycles is published through a watch channel.
///
/// This is the synchronous core, a `BatchHandle` exposes it to async transports.
pub struct BatchAssembler<M: Model> {
    state: Mutex<AssemblerState>,
    evaluator: Arc<Evaluator<M>>,
    done: watch::Sender<u64>,
}

impl<M: Model> BatchAssembler<M> {
    /// Creates a new `BatchAssembler`.
    ///
    /// # Arguments
    /// * `clients` - The batch size.
    /// * `layout` - The record sizes.
    /// * `evaluator` - The evaluator to run every full batch through.
    ///
    /// # Returns
    /// A new `BatchAssembler` instance.
    pub fn new(clients: usize, layout: RecordLayout, evaluator: Arc<Evaluator<M>>) -> Self {
        let (done, _) = watch::channel(0);

        Self {
            state: Mutex::new(AssemblerState {
                slots: SlotBuffer::new(clients, layout),
                cycle: 0,
                closed: false,
            }),
            evaluator,
            done,
        }
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().slots.capacity()
    }

    pub fn layout(&self) -> RecordLayout {
        self.state.lock().slots.layout()
    }

    /// The current cycle, the one new submissions go to.
    pub fn cycle(&self) -> u64 {
        self.state.lock().cycle
    }

    /// The amount of slots filled in the current cycle.
    pub fn filled(&self) -> usize {
        self.state.lock().slots.filled_count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Returns a receiver of the amount of completed cycles.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.done.subscribe()
    }

    /// Writes `client`'s input into its slot, evaluating the batch if it is now full.
    ///
    /// # Arguments
    /// * `client` - The submitting client.
    /// * `bytes` - The raw input record.
    ///
    /// # Returns
    /// The submission state, or an error if the input was rejected, in which case no slot was
    /// touched.
    pub fn submit(&self, client: ClientId, bytes: &[u8]) -> Result<Submission> {
        let mut state = self.state.lock();

        if state.closed {
            return Err(DispatchErr::ShuttingDown);
        }

        match state.slots.write_input(client, bytes)? {
            Fill::Partial(filled) => {
                debug!(client_id = client, filled = filled; "request accepted");
                Ok(Submission::Pending { cycle: state.cycle })
            }
            Fill::Full => Ok(Submission::Complete(self.complete(&mut state))),
        }
    }

    /// Evaluates whatever was submitted so far and stops accepting submissions.
    ///
    /// Empty slots are zeroed before evaluation and their outputs are meaningless.
    ///
    /// # Returns
    /// The evaluated partial batch, `None` if no slot was filled.
    pub fn flush(&self) -> Result<Option<Completed>> {
        let mut state = self.state.lock();

        if state.closed {
            return Ok(None);
        }

        state.closed = true;

        if state.slots.filled_count() == 0 {
            return Ok(None);
        }

        debug!(filled = state.slots.filled_count(); "flushing partial batch");
        state.slots.zero_unfilled();
        Ok(Some(self.complete(&mut state)))
    }

    /// Runs the evaluation of the current cycle and moves on to the next one.
    ///
    /// A failed evaluation is logged and answered with output records filled with NaN, so
    /// every client of the cycle still gets exactly one reply.
    fn complete(&self, state: &mut MutexGuard<'_, AssemblerState>) -> Completed {
        let cycle = state.cycle;
        let clients = state.slots.filled_clients();

        let evaluated = self.evaluator.evaluate(state.slots.batch());
        let stored = evaluated.and_then(|outputs| {
            state.slots.store_outputs(&outputs)?;
            Ok(outputs)
        });

        let outputs = match stored {
            Ok(outputs) => outputs,
            Err(e) => {
                error!("batch {cycle} failed, answering with NaN: {e}");
                state.slots.fill_outputs(f32::NAN);
                state.slots.outputs().to_owned()
            }
        };

        state.slots.clear();
        state.cycle += 1;

        self.done.send_replace(state.cycle);
        Completed {
            cycle,
            clients,
            outputs,
        }
    }

    /// Copies `client`'s output of the completed `cycle` into `out`.
    ///
    /// Valid until the client submits again, which is the only way the cycle after `cycle`
    /// can complete.
    ///
    /// # Returns
    /// `OutputShape` if that cycle's evaluation failed or `out` has the wrong length.
    pub fn output(&self, cycle: u64, client: ClientId, out: &mut [f32]) -> Result<()> {
        let state = self.state.lock();
        debug_assert!(state.cycle > cycle, "cycle {cycle} has not completed");

        copy_row(state.slots.output(client)?, out)
    }
}

#[cfg(test)]
mod tests {
    use model::{Geometry, WeightSet};
    use ndarray::ArrayView2;

    use super::*;
    use crate::evaluation::WeightId;

    const GEOMETRY: Geometry = Geometry {
        input_planes: 1,
        board_size: 1,
        value_hidden: 1,
    };

    /// Fills every output row with the first input of its row.
    struct Tag;

    impl Model for Tag {
        fn forward(&self, _: &WeightSet, batch: ArrayView2<f32>) -> Array2<f32> {
            Array2::from_shape_fn((batch.nrows(), GEOMETRY.output_len()), |(i, _)| batch[[i, 0]])
        }
    }

    struct Broken;

    impl Model for Broken {
        fn forward(&self, _: &WeightSet, _: ArrayView2<f32>) -> Array2<f32> {
            Array2::zeros((1, 1))
        }
    }

    fn assembler<M: Model>(model: M, clients: usize) -> Result<BatchAssembler<M>> {
        let set = WeightSet::constant(&GEOMETRY, 0, 1, 0.);
        let evaluator = Evaluator::new(model, GEOMETRY, WeightId::new("a"), set)?;
        let layout = RecordLayout::new(GEOMETRY.input_len(), GEOMETRY.output_len());

        Ok(BatchAssembler::new(clients, layout, Arc::new(evaluator)))
    }

    fn input(value: f32) -> Vec<u8> {
        value.to_ne_bytes().to_vec()
    }

    #[test]
    fn last_submission_completes_the_batch() -> Result<()> {
        let assembler = assembler(Tag, 3)?;

        assert!(matches!(assembler.submit(2, &input(2.))?, Submission::Pending { cycle: 0 }));
        assert!(matches!(assembler.submit(0, &input(0.5))?, Submission::Pending { cycle: 0 }));

        let Submission::Complete(completed) = assembler.submit(1, &input(1.))? else {
            panic!("the batch should have completed");
        };

        assert_eq!(completed.cycle, 0);
        assert_eq!(completed.clients, vec![0, 1, 2]);
        assert_eq!(completed.output(0).to_vec(), vec![0.5; 3]);
        assert_eq!(completed.output(2).to_vec(), vec![2.; 3]);

        let mut out = [0.; 3];
        assembler.output(0, 2, &mut out)?;
        assert_eq!(out, [2.; 3]);
        assert_eq!(assembler.cycle(), 1);
        assert_eq!(*assembler.subscribe().borrow(), 1);
        Ok(())
    }

    #[test]
    fn rejected_submissions_leave_the_cycle_alone() -> Result<()> {
        let assembler = assembler(Tag, 2)?;
        assembler.submit(0, &input(1.))?;

        assert!(matches!(
            assembler.submit(0, &input(7.)),
            Err(DispatchErr::DuplicateOffer { client: 0 })
        ));
        assert!(matches!(
            assembler.submit(1, &[0; 3]),
            Err(DispatchErr::MalformedRequest { .. })
        ));

        let Submission::Complete(completed) = assembler.submit(1, &input(3.))? else {
            panic!("the batch should have completed");
        };
        assert_eq!(completed.output(0).to_vec(), vec![1.; 3]);
        Ok(())
    }

    #[test]
    fn flush_evaluates_a_partial_batch_and_closes() -> Result<()> {
        let assembler = assembler(Tag, 3)?;
        assembler.submit(1, &input(4.))?;

        let completed = assembler.flush()?.expect("one slot was filled");
        assert_eq!(completed.clients, vec![1]);
        assert_eq!(completed.output(1).to_vec(), vec![4.; 3]);
        assert_eq!(completed.output(0).to_vec(), vec![0.; 3]);

        assert!(assembler.is_closed());
        assert!(matches!(assembler.submit(0, &input(1.)), Err(DispatchErr::ShuttingDown)));
        assert!(assembler.flush()?.is_none());
        Ok(())
    }

    #[test]
    fn flush_of_an_empty_batch() -> Result<()> {
        let assembler = assembler(Tag, 2)?;

        assert!(assembler.flush()?.is_none());
        assert_eq!(assembler.cycle(), 0);
        assert!(assembler.is_closed());
        Ok(())
    }

    #[test]
    fn failed_evaluation_answers_every_client_with_nan() -> Result<()> {
        let assembler = assembler(Broken, 2)?;
        assembler.submit(0, &input(1.))?;

        let Submission::Complete(completed) = assembler.submit(1, &input(1.))? else {
            panic!("the batch should have completed");
        };
        assert_eq!(completed.clients, vec![0, 1]);
        assert!(completed.output(1).iter().all(|v| v.is_nan()));

        let mut out = [0.; 3];
        assembler.output(0, 0, &mut out)?;
        assert!(out.iter().all(|v| v.is_nan()));

        assert_eq!(assembler.cycle(), 1);
        assert!(matches!(assembler.submit(0, &input(1.))?, Submission::Pending { cycle: 1 }));
        Ok(())
    }
}
