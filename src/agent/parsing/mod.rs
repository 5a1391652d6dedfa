//! Turning free-text model replies into structured values.

mod normalizer;
pub use normalizer::*;
