//! Messages exchanged with the user-mode file system.
//!
//! Every message starts with a fixed `#[repr(C)]` header followed by a variable payload. All
//! payload lengths are carried explicitly in the header and validated against the total message
//! size before any payload byte is read; nothing is inferred from null termination.
mod answer;
mod query;

pub use answer::*;
pub use query::*;

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use crate::error::{BridgeError, Result};

/// Identifies one outstanding request across the boundary.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
pub struct CorrelationId(pub u64);

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct QueryHeader {
    pub size: u32,
    pub flags: u32,
    pub correlation_id: u64,
    pub continuation_context: u64,
    pub process_id: u32,
    pub information_class: u32,
    pub buffer_length: u32,
    pub cursor: u32,
    pub directory_name_length: u32,
    pub search_pattern_length: u32,
    pub search_pattern_offset: u32,
    pub reserved: u32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct AnswerHeader {
    pub size: u32,
    pub status: i32,
    pub correlation_id: u64,
    pub continuation_context: u64,
    pub buffer_length: u32,
    pub next_cursor: u32,
}

const_assert_eq!(std::mem::size_of::<QueryHeader>(), 56);
const_assert_eq!(std::mem::size_of::<AnswerHeader>(), 32);

/// Size of the fixed part of an enumeration request.
pub const QUERY_HEADER_SIZE: usize = std::mem::size_of::<QueryHeader>();
/// Size of the fixed part of an enumeration answer.
pub const ANSWER_HEADER_SIZE: usize = std::mem::size_of::<AnswerHeader>();

/// Read a header off the front of `message` and check it declares the whole message.
pub(crate) fn read_header<H: Pod>(message: &[u8], declared_size: impl Fn(&H) -> u32) -> Result<H> {
    let header_size = std::mem::size_of::<H>();
    if message.len() < header_size {
        return Err(BridgeError::MalformedMessage("message shorter than its header"));
    }
    let header: H = bytemuck::pod_read_unaligned(&message[..header_size]);
    if declared_size(&header) as usize != message.len() {
        return Err(BridgeError::MalformedMessage(
            "declared size does not match message length",
        ));
    }
    Ok(header)
}

/// Allocate a zeroed message of `size` bytes, reporting allocation failure instead of aborting.
pub(crate) fn allocate_message(size: usize) -> Result<Vec<u8>> {
    let mut message = Vec::new();
    message.try_reserve_exact(size)?;
    message.resize(size, 0);
    Ok(message)
}
