use std::io;

use comms::{
    RecordLayout,
    shm::{RegionLayout, Semaphore, SharedRegion, ShmNames},
};
use log::debug;

use crate::{ClientErr, Result};

/// A producer attached to a dispatcher's shared memory region.
///
/// All calls block, this client is meant for a dedicated thread.
pub struct ShmClient {
    id: usize,
    layout: RegionLayout,
    region: SharedRegion,
    input_ready: Semaphore,
    output_ready: Semaphore,
}

impl ShmClient {
    /// Takes the next client id of the region named by `prefix`.
    ///
    /// The id counter in the region header is guarded by the `<prefix>_counter` semaphore.
    /// Once registered the client posts its input semaphore once to tell the dispatcher it
    /// is connected.
    ///
    /// # Arguments
    /// * `prefix` - The common name of the shared objects.
    /// * `record` - The record sizes.
    ///
    /// # Returns
    /// The registered client, `CapacityExceeded` if every slot is taken, `RegionTooSmall` if
    /// the region can't hold `record` for every client or an io error if the dispatcher's
    /// objects don't exist.
    pub fn register(prefix: &str, record: RecordLayout) -> Result<Self> {
        let names = ShmNames::new(prefix);
        let region = SharedRegion::open(&names.region())?;
        let counter = Semaphore::open(&names.counter())?;

        counter.wait()?;
        let registered = Self::take_id(&region);
        counter.post()?;
        let (id, capacity) = registered?;

        let layout = RegionLayout::new(capacity, record);
        if region.len() < layout.size() {
            return Err(ClientErr::RegionTooSmall {
                got: region.len(),
                expected: layout.size(),
            });
        }

        let input_ready = Semaphore::open(&names.input_ready(id))?;
        let output_ready = Semaphore::open(&names.output_ready(id))?;
        input_ready.post()?;

        debug!(client_id = id; "registered in {}", names.region());

        Ok(Self {
            id,
            layout,
            region,
            input_ready,
            output_ready,
        })
    }

    /// Reads and bumps the next id, must be called with the counter semaphore held.
    fn take_id(region: &SharedRegion) -> Result<(usize, usize)> {
        let id = region.read_u32(RegionLayout::NEXT_ID_OFFSET)? as usize;
        let capacity = region.read_u32(RegionLayout::BATCH_SIZE_OFFSET)? as usize;

        if id >= capacity {
            return Err(ClientErr::CapacityExceeded { capacity });
        }

        region.write_u32(RegionLayout::NEXT_ID_OFFSET, id as u32 + 1)?;
        Ok((id, capacity))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Evaluates a single position.
    ///
    /// # Arguments
    /// * `input` - The input record.
    /// * `output` - Where the output record will be written to.
    pub fn evaluate(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        let record = self.layout.record();

        if input.len() != record.input_len() || output.len() != record.output_len() {
            return Err(ClientErr::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "records of {} and {} floats don't match the layout {record:?}",
                    input.len(),
                    output.len()
                ),
            )));
        }

        self.region
            .write_f32s(self.layout.input_offset(self.id), input)?;
        self.input_ready.post()?;

        self.output_ready.wait()?;
        self.region
            .read_f32s(self.layout.output_offset(self.id), output)?;

        Ok(())
    }
}
