// crates/reelcore/src/events/mod.rs

mod progress;

pub use progress::{ProgressEvent, ProgressObserver, ProgressPublisher};
