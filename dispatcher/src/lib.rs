mod error;
pub mod evaluation;
pub mod registry;
pub mod service;
pub mod storage;
pub mod transport;

pub use error::{DispatchErr, Result};
