#![cfg_attr(feature = "docsrs", feature(doc_cfg))]
#![forbid(unsafe_code)]
//! Directory-control dispatch and completion bridge.
//!
//! The bridge accepts directory-control requests on open handles, forwards enumerations to a
//! user-mode file system as self-describing messages, and completes the original callers once
//! the answers come back. Change notifications are parked on a [`NotifyList`](filesystem::NotifyList).

pub mod constants;
mod error;
pub mod filesystem;
pub mod host;
pub mod irp;
pub mod protocol;
pub mod util;

#[cfg(feature = "notify")]
#[cfg_attr(feature = "docsrs", doc(cfg(feature = "notify")))]
pub mod notify;

// only publicly export notify if feature is enabled.
#[cfg(not(feature = "notify"))]
#[allow(dead_code)]
mod notify;

pub use error::{BridgeError, NtStatus, Result};

pub use widestring::{U16Str, U16String};
