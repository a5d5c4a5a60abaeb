const FLOAT_SIZE: usize = size_of::<f32>();

/// The sizes of the two fixed records exchanged between a worker and the dispatcher.
///
/// Lengths are counted in `f32` values, every payload on every transport is a plain
/// native-endian `f32` array of exactly this length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    input_len: usize,
    output_len: usize,
}

impl RecordLayout {
    /// Creates a new `RecordLayout`.
    ///
    /// # Arguments
    /// * `input_len` - The amount of floats in a request.
    /// * `output_len` - The amount of floats in a response.
    ///
    /// # Returns
    /// A new `RecordLayout` instance.
    pub const fn new(input_len: usize, output_len: usize) -> Self {
        Self {
            input_len,
            output_len,
        }
    }

    pub const fn input_len(&self) -> usize {
        self.input_len
    }

    pub const fn output_len(&self) -> usize {
        self.output_len
    }

    /// The size in bytes of a request on the wire.
    pub const fn input_bytes(&self) -> usize {
        self.input_len * FLOAT_SIZE
    }

    /// The size in bytes of a response on the wire.
    pub const fn output_bytes(&self) -> usize {
        self.output_len * FLOAT_SIZE
    }
}
