pub mod engine;

pub use engine::{FilterEngine, FilterError};
