#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Schema preparation, validation and record synthesis for `dataforge`.

/// Public entry points (preparer service, generation modes).
pub mod api;

mod cache;
mod faker;
mod generate;
mod prepare;
mod validate;

pub use api::{CacheStats, Mode, Preparer, PreparerStats};
pub use generate::one;
pub use prepare::canonical_key;
