//! File-system object state and the handlers serving directory-control requests on it.
mod context;
mod directory;
mod notify;

pub use context::*;
pub use directory::*;
pub use notify::*;
