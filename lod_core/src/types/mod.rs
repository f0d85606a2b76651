//! Basic byte-oriented value types.

mod blob;
pub use blob::*;
