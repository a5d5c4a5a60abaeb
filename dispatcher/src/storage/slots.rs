use comms::RecordLayout;
use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{DispatchErr, Result, registry::ClientId};

const FLOAT_SIZE: usize = size_of::<f32>();

/// The state of a `SlotBuffer` after an input was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Some slots are still empty, holds the amount of filled ones.
    Partial(usize),
    Full,
}

/// One input row and one output row per client, reused every cycle.
///
/// Row `k` always belongs to client `k`, so gathering and scattering never search.
#[derive(Debug)]
pub struct SlotBuffer {
    layout: RecordLayout,
    inputs: Array2<f32>,
    outputs: Array2<f32>,
    filled: Vec<bool>,
    count: usize,
}

impl SlotBuffer {
    /// Creates a new `SlotBuffer`.
    ///
    /// # Arguments
    /// * `clients` - The amount of slots, the batch size.
    /// * `layout` - The record sizes.
    ///
    /// # Returns
    /// A new `SlotBuffer` instance with every slot empty.
    pub fn new(clients: usize, layout: RecordLayout) -> Self {
        Self {
            layout,
            inputs: Array2::zeros((clients, layout.input_len())),
            outputs: Array2::zeros((clients, layout.output_len())),
            filled: vec![false; clients],
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.filled.len()
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn filled_count(&self) -> usize {
        self.count
    }

    pub fn is_filled(&self, client: ClientId) -> bool {
        self.filled.get(client).copied().unwrap_or_default()
    }

    /// Copies a raw input record into `client`'s slot.
    ///
    /// Nothing is written unless the whole request is accepted.
    ///
    /// # Arguments
    /// * `client` - The owner of the slot.
    /// * `bytes` - The native endian input record.
    ///
    /// # Returns
    /// The fill state after writing, `UnknownClient`, `MalformedRequest` or `DuplicateOffer`.
    pub fn write_input(&mut self, client: ClientId, bytes: &[u8]) -> Result<Fill> {
        let capacity = self.capacity();

        if client >= capacity {
            return Err(DispatchErr::UnknownClient { client, capacity });
        }

        let expected = self.layout.input_bytes();
        if bytes.len() != expected {
            return Err(DispatchErr::MalformedRequest {
                got: bytes.len(),
                expected,
            });
        }

        if self.filled[client] {
            return Err(DispatchErr::DuplicateOffer { client });
        }

        self.inputs
            .row_mut(client)
            .iter_mut()
            .zip(bytes.chunks_exact(FLOAT_SIZE))
            .for_each(|(dst, chunk)| *dst = bytemuck::pod_read_unaligned(chunk));

        self.filled[client] = true;
        self.count += 1;

        if self.count == capacity {
            Ok(Fill::Full)
        } else {
            Ok(Fill::Partial(self.count))
        }
    }

    /// The ids of the clients whose slot is filled, in ascending order.
    pub fn filled_clients(&self) -> Vec<ClientId> {
        self.filled
            .iter()
            .enumerate()
            .filter_map(|(client, &filled)| filled.then_some(client))
            .collect()
    }

    /// Zeroes the input rows of every empty slot so a partial batch carries no stale data.
    pub fn zero_unfilled(&mut self) {
        for (mut row, _) in self
            .inputs
            .rows_mut()
            .into_iter()
            .zip(&self.filled)
            .filter(|(_, filled)| !**filled)
        {
            row.fill(0.);
        }
    }

    /// The whole input batch, one row per client.
    pub fn batch(&self) -> ArrayView2<'_, f32> {
        self.inputs.view()
    }

    /// Stores the evaluated batch for the clients to pick up.
    ///
    /// # Returns
    /// `OutputShape` if `outputs` isn't one output record per client.
    pub fn store_outputs(&mut self, outputs: &Array2<f32>) -> Result<()> {
        if outputs.dim() != self.outputs.dim() {
            return Err(DispatchErr::OutputShape {
                got: outputs.dim(),
                expected: self.outputs.dim(),
            });
        }

        self.outputs.assign(outputs);
        Ok(())
    }

    /// Overwrites every output record with `value`.
    pub fn fill_outputs(&mut self, value: f32) {
        self.outputs.fill(value);
    }

    pub fn outputs(&self) -> ArrayView2<'_, f32> {
        self.outputs.view()
    }

    /// The last stored output of `client`.
    pub fn output(&self, client: ClientId) -> Result<ArrayView1<'_, f32>> {
        if client >= self.capacity() {
            return Err(DispatchErr::UnknownClient {
                client,
                capacity: self.capacity(),
            });
        }

        Ok(self.outputs.row(client))
    }

    /// Marks every slot as empty, the contents stay until overwritten.
    pub fn clear(&mut self) {
        self.filled.fill(false);
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: RecordLayout = RecordLayout::new(2, 3);

    fn bytes(values: &[f32]) -> Vec<u8> {
        bytemuck::cast_slice(values).to_vec()
    }

    #[test]
    fn fills_rows_by_client() -> Result<()> {
        let mut slots = SlotBuffer::new(2, LAYOUT);

        assert_eq!(slots.write_input(1, &bytes(&[3., 4.]))?, Fill::Partial(1));
        assert_eq!(slots.write_input(0, &bytes(&[1., 2.]))?, Fill::Full);

        assert_eq!(slots.batch(), ndarray::array![[1., 2.], [3., 4.]]);
        assert_eq!(slots.filled_clients(), vec![0, 1]);
        Ok(())
    }

    #[test]
    fn unaligned_input_bytes() -> Result<()> {
        let mut slots = SlotBuffer::new(1, LAYOUT);
        let mut raw = vec![0xff];
        raw.extend(bytes(&[0.5, -8.]));

        slots.write_input(0, &raw[1..])?;

        assert_eq!(slots.batch().row(0).to_vec(), vec![0.5, -8.]);
        Ok(())
    }

    #[test]
    fn rejects_without_mutating() -> Result<()> {
        let mut slots = SlotBuffer::new(2, LAYOUT);
        slots.write_input(0, &bytes(&[1., 2.]))?;

        assert!(matches!(
            slots.write_input(0, &bytes(&[9., 9.])),
            Err(DispatchErr::DuplicateOffer { client: 0 })
        ));
        assert!(matches!(
            slots.write_input(1, &bytes(&[9.])),
            Err(DispatchErr::MalformedRequest {
                got: 4,
                expected: 8
            })
        ));
        assert!(matches!(
            slots.write_input(2, &bytes(&[9., 9.])),
            Err(DispatchErr::UnknownClient {
                client: 2,
                capacity: 2
            })
        ));

        assert_eq!(slots.batch(), ndarray::array![[1., 2.], [0., 0.]]);
        assert_eq!(slots.filled_count(), 1);
        assert!(!slots.is_filled(1));
        Ok(())
    }

    #[test]
    fn unfilled_rows_are_zeroed() -> Result<()> {
        let mut slots = SlotBuffer::new(2, LAYOUT);
        slots.write_input(0, &bytes(&[1., 2.]))?;
        slots.write_input(1, &bytes(&[3., 4.]))?;
        slots.clear();

        slots.write_input(1, &bytes(&[5., 6.]))?;
        slots.zero_unfilled();

        assert_eq!(slots.batch(), ndarray::array![[0., 0.], [5., 6.]]);
        Ok(())
    }

    #[test]
    fn outputs_shape_is_checked() -> Result<()> {
        let mut slots = SlotBuffer::new(2, LAYOUT);

        let wrong = Array2::zeros((2, 4));
        assert!(matches!(
            slots.store_outputs(&wrong),
            Err(DispatchErr::OutputShape {
                got: (2, 4),
                expected: (2, 3)
            })
        ));

        let outputs = ndarray::array![[1., 2., 3.], [4., 5., 6.]];
        slots.store_outputs(&outputs)?;
        assert_eq!(slots.output(1)?.to_vec(), vec![4., 5., 6.]);
        Ok(())
    }
}
