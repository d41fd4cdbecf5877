//! The runtime host that owns pending directory-control requests and routes requests and answers
//! between the original callers and the user-mode file system.
mod completion;
mod debug;
mod fshost;
pub(crate) mod interface;
mod params;
mod pending;
mod transport;

pub use completion::*;
pub use debug::*;
pub use fshost::*;
pub use interface::{Dispatched, DirectoryOperation, RequestDispatcher};
pub use params::*;
pub use pending::*;
pub use transport::*;
