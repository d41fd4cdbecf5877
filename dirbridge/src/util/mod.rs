//! Helpful utility wrappers around caller memory.

mod pin;

pub use pin::*;
