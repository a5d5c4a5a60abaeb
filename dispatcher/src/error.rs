use std::{error::Error, fmt, io};

use model::WeightFormatErr;

/// The dispatcher's result type.
pub type Result<T> = std::result::Result<T, DispatchErr>;

/// Dispatcher failures.
#[derive(Debug)]
pub enum DispatchErr {
    Io(io::Error),
    InvalidWeightFormat(WeightFormatErr),
    InvalidBatchSize {
        batch_size: usize,
        instances: usize,
    },
    CapacityExceeded {
        capacity: usize,
    },
    MalformedRequest {
        got: usize,
        expected: usize,
    },
    DuplicateOffer {
        client: usize,
    },
    UnknownClient {
        client: usize,
        capacity: usize,
    },
    OutputShape {
        got: (usize, usize),
        expected: (usize, usize),
    },
    ShuttingDown,
}

impl fmt::Display for DispatchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchErr::Io(e) => write!(f, "io error: {e}"),
            DispatchErr::InvalidWeightFormat(e) => write!(f, "invalid weight format: {e}"),
            DispatchErr::InvalidBatchSize {
                batch_size,
                instances,
            } => write!(
                f,
                "batch size {batch_size} must be non zero and divide {instances} instances"
            ),
            DispatchErr::CapacityExceeded { capacity } => {
                write!(f, "all {capacity} client ids are taken")
            }
            DispatchErr::MalformedRequest { got, expected } => {
                write!(f, "malformed request of {got} bytes, expected {expected}")
            }
            DispatchErr::DuplicateOffer { client } => {
                write!(f, "client {client} already offered a request this cycle")
            }
            DispatchErr::UnknownClient { client, capacity } => {
                write!(f, "unknown client {client} for a batch of {capacity}")
            }
            DispatchErr::OutputShape { got, expected } => write!(
                f,
                "model output has shape {got:?}, expected {expected:?}"
            ),
            DispatchErr::ShuttingDown => f.write_str("the dispatcher is shutting down"),
        }
    }
}

impl Error for DispatchErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DispatchErr::Io(e) => Some(e),
            DispatchErr::InvalidWeightFormat(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DispatchErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<WeightFormatErr> for DispatchErr {
    fn from(value: WeightFormatErr) -> Self {
        Self::InvalidWeightFormat(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<DispatchErr> for io::Error {
    fn from(value: DispatchErr) -> Self {
        match value {
            DispatchErr::Io(e) => e,
            other @ DispatchErr::InvalidBatchSize { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, other)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
