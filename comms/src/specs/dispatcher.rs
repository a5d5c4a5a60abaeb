use std::{net::SocketAddr, num::NonZeroUsize, path::PathBuf};

use serde::{Deserialize, Serialize};

const fn default_poll_interval_secs() -> u64 {
    10
}

/// The specification for the `Transport` trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportSpec {
    SharedMemory { prefix: String },
    Udp { addr: SocketAddr },
    Tcp { addr: SocketAddr },
}

/// The specification for the `WeightSource` trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSourceSpec {
    File { path: PathBuf },
    Directory { path: PathBuf },
}

/// The board and network dimensions shared by the records and the weight files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometrySpec {
    pub input_planes: usize,
    pub board_size: usize,
    pub value_hidden: usize,
}

impl Default for GeometrySpec {
    fn default() -> Self {
        Self {
            input_planes: 18,
            board_size: 19,
            value_hidden: 256,
        }
    }
}

/// The specification for the `Dispatcher` service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherSpec {
    pub batch_size: NonZeroUsize,
    pub instances: Option<usize>,
    pub transport: TransportSpec,
    pub weights: WeightSourceSpec,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub geometry: GeometrySpec,
}
