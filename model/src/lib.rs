mod geometry;
mod model;
pub mod weights;

pub use geometry::Geometry;
pub use model::{Model, UniformModel};
pub use weights::{WeightFormatErr, WeightSet};
