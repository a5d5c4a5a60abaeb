mod evaluator;
mod source;
mod updater;

pub use evaluator::Evaluator;
pub use source::{
    BEST_NETWORK_POINTER, DirectorySource, FileSource, WeightId, WeightSource, load_weights,
};
pub use updater::{PollOutcome, WeightUpdater};
