mod dispatcher;

pub use dispatcher::{DispatcherSpec, GeometrySpec, TransportSpec, WeightSourceSpec};
