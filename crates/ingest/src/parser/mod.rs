/// Log parsing and normalization module
///
/// Converts raw log lines from heterogeneous producers into one canonical
/// [`NormalizedEvent`].
///
/// # Architecture
///
/// - `traits.rs`: the `LogParser` trait every format implements
/// - `formats/`: individual format parser implementations
/// - `normalize.rs`: shared timestamp and severity normalization
/// - `synonyms.rs`: per-format key → canonical slot tables
/// - `registry.rs`: declared format → parser map with the generic fallback
///
/// # Safety Guarantees
///
/// All parsers implement:
/// - Bounded input (line size limit)
/// - Panic containment (the registry wraps every call)
/// - Verbatim `raw` preservation, even when ANSI codes were stripped

pub mod formats;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod synonyms;
pub mod traits;
mod ansi;
pub(crate) mod serde_utils;

// Re-export commonly used types
pub use ansi::strip_ansi_codes;
pub use model::{LogFormat, NormalizedEvent, ParseError, Severity};
pub use registry::ParserRegistry;
pub use traits::LogParser;

// Constants
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
