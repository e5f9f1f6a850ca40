//! Bounded in-memory storage: the event ring and the parse-error ring.

pub mod errors;
pub mod events;

pub use errors::{ErrorRing, ParseErrorRecord, MAX_ERROR_RAW_LEN};
pub use events::EventStore;
