use crate::RecordLayout;

/// Size of the region header: the next client id and the batch size, both `u32`.
pub const HEADER_SIZE: usize = 8;
/// Gap between the input and the output slots.
pub const PAD_SIZE: usize = 8;

/// The names of every shared memory object under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmNames {
    prefix: String,
}

impl ShmNames {
    /// Creates a new `ShmNames`.
    ///
    /// # Arguments
    /// * `prefix` - The common prefix, without the leading slash.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn region(&self) -> String {
        format!("/{}", self.prefix)
    }

    pub fn counter(&self) -> String {
        format!("/{}_counter", self.prefix)
    }

    /// The semaphore the dispatcher posts once client `k`'s output is written (`A[k]`).
    pub fn output_ready(&self, k: usize) -> String {
        format!("/{}_A_{k}", self.prefix)
    }

    /// The semaphore client `k` posts once its input is written (`B[k]`).
    pub fn input_ready(&self, k: usize) -> String {
        format!("/{}_B_{k}", self.prefix)
    }
}

/// Byte offsets inside the shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    clients: usize,
    record: RecordLayout,
}

impl RegionLayout {
    pub const NEXT_ID_OFFSET: usize = 0;
    pub const BATCH_SIZE_OFFSET: usize = 4;

    pub fn new(clients: usize, record: RecordLayout) -> Self {
        Self { clients, record }
    }

    pub fn clients(&self) -> usize {
        self.clients
    }

    pub fn record(&self) -> RecordLayout {
        self.record
    }

    pub fn input_offset(&self, k: usize) -> usize {
        HEADER_SIZE + k * self.record.input_bytes()
    }

    pub fn output_offset(&self, k: usize) -> usize {
        let inputs = self.clients * self.record.input_bytes();
        HEADER_SIZE + inputs + PAD_SIZE + k * self.record.output_bytes()
    }

    /// The total size of the region in bytes.
    pub fn size(&self) -> usize {
        self.output_offset(self.clients)
    }
}
