mod assembler;
mod handle;
mod slots;

pub use assembler::{BatchAssembler, Completed, Submission};
pub use handle::BatchHandle;
pub use slots::{Fill, SlotBuffer};
