mod builder;
mod dispatcher;

pub use builder::{DispatcherBuilder, shard_count};
pub use dispatcher::{Dispatcher, Shard};
