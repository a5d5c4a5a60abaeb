pub mod client;
mod error;
mod geometry;

pub use client::{ShmClient, TcpClient, UdpClient};
pub use error::{ClientErr, Result};
pub use geometry::{geometry_from, geometry_from_env, parse_or, spec_geometry};
