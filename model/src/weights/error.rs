use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type for weight file parsing and validation.
pub type Result<T> = std::result::Result<T, WeightFormatErr>;

/// Error returned whenever a weight file can't be turned into a usable `WeightSet`.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightFormatErr {
    WrongVersion {
        found: String,
    },
    TooShort {
        lines: usize,
    },
    InconsistentLayers {
        lines: usize,
    },
    BadFloat {
        line: usize,
        token: String,
    },
    ShapeMismatch {
        tensor: usize,
        got: usize,
        expected: usize,
    },
}

impl Display for WeightFormatErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightFormatErr::WrongVersion { found } => {
                write!(f, "unsupported weight file version {found:?}")
            }
            WeightFormatErr::TooShort { lines } => {
                write!(f, "weight file has only {lines} lines")
            }
            WeightFormatErr::InconsistentLayers { lines } => {
                write!(f, "{lines} lines are not a whole number of residual blocks")
            }
            WeightFormatErr::BadFloat { line, token } => {
                write!(f, "invalid float {token:?} on line {line}")
            }
            WeightFormatErr::ShapeMismatch {
                tensor,
                got,
                expected,
            } => write!(
                f,
                "tensor {tensor} has {got} values, expected {expected}"
            ),
        }
    }
}

impl Error for WeightFormatErr {}
