//! Weight files.
//!
//! A weight file is plain text: a version line holding `1`, then one tensor per line as
//! space separated decimal floats. A network with `b` residual blocks has `19 + 8b` lines
//! counting the version line, the filter count is the length of the input convolution's
//! biases on line 2.

mod error;
mod set;

pub use error::{Result, WeightFormatErr};
pub use set::{WeightSet, tensor_lens};

/// The only weight file version understood.
pub const VERSION: &str = "1";

/// Lines of a network without residual blocks, version line included.
const BASE_LINES: usize = 19;
/// Lines added by every residual block: two convolutions of four tensors each.
const LINES_PER_BLOCK: usize = 8;
