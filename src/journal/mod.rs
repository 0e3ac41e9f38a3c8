//! Journal module containing entry posting and code generation

pub mod code;
pub mod engine;

pub use engine::*;
