//! Read side: predicate search over stored events and common-schema export.

pub mod export;
pub mod search;

pub use export::{export, CommonSchemaEvent};
pub use search::{search, QueryError, FIELD_ACCESSORS, LABEL_PREFIX};
