use std::{error::Error, fmt, io};

/// The worker module's result type.
pub type Result<T> = std::result::Result<T, ClientErr>;

/// Client side failures.
#[derive(Debug)]
pub enum ClientErr {
    Io(io::Error),
    CapacityExceeded { capacity: usize },
    MalformedResponse { got: usize, expected: usize },
    RegionTooSmall { got: usize, expected: usize },
}

impl fmt::Display for ClientErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientErr::Io(e) => write!(f, "io error: {e}"),
            ClientErr::CapacityExceeded { capacity } => {
                write!(f, "the dispatcher already has its {capacity} clients")
            }
            ClientErr::MalformedResponse { got, expected } => {
                write!(f, "malformed response of {got} bytes, expected {expected}")
            }
            ClientErr::RegionTooSmall { got, expected } => {
                write!(f, "shared region of {got} bytes, the layout needs {expected}")
            }
        }
    }
}

impl Error for ClientErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Boundary conversion for binaries / I/O APIs.
impl From<ClientErr> for io::Error {
    fn from(value: ClientErr) -> Self {
        match value {
            ClientErr::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
