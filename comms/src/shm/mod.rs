//! Named POSIX shared memory objects used by the shared memory transport.
//!
//! The dispatcher owns a region laid out as
//! `[header: u32 next id, u32 batch size][N inputs][pad][N outputs]` and, for every client
//! `k`, two semaphores created at zero: `B[k]` (input ready) and `A[k]` (output ready). The
//! `<prefix>_counter` semaphore guards the next id field of the header.
//!
//! Only linux is supported.

mod layout;
mod region;
mod semaphore;

use std::io;

pub use layout::{RegionLayout, ShmNames};
pub use region::SharedRegion;
pub use semaphore::Semaphore;

/// Unlinks every object named by `names` for `clients` clients.
///
/// Objects that do not exist are skipped.
///
/// # Arguments
/// * `names` - The names of the objects.
/// * `clients` - The amount of per client semaphore pairs.
///
/// # Returns
/// The first error that is not `NotFound`.
pub fn unlink_all(names: &ShmNames, clients: usize) -> io::Result<()> {
    SharedRegion::unlink(&names.region())?;
    Semaphore::unlink(&names.counter())?;

    for k in 0..clients {
        Semaphore::unlink(&names.output_ready(k))?;
        Semaphore::unlink(&names.input_ready(k))?;
    }

    Ok(())
}
