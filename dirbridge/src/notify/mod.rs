//! Helpers to deliver directory change notifications.
//!
//! [`DirNotifyList`] is a ready-made [`NotifyList`](crate::filesystem::NotifyList) that keeps
//! parked notifications in memory and resolves them as changes are reported.
mod notifyinfo;
mod notifylist;

pub use notifyinfo::*;
pub use notifylist::*;
