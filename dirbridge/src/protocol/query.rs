use std::borrow::Cow;

use widestring::{U16Str, U16String};

use crate::constants::{InformationClass, QueryFlag};
use crate::error::{BridgeError, Result};
use crate::protocol::{allocate_message, read_header, CorrelationId, QueryHeader, QUERY_HEADER_SIZE};

/// A directory-enumeration request sent to the user-mode file system.
///
/// Borrowed names are used when packing on the submission path; [`decode`](Self::decode)
/// yields owned names on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationRequest<'a> {
    pub correlation_id: CorrelationId,
    /// Query flags of the original call, forwarded verbatim.
    pub flags: u8,
    pub process_id: u32,
    pub information_class: InformationClass,
    /// Capacity of the caller's destination buffer.
    pub buffer_length: u32,
    /// Resume position.
    pub cursor: u32,
    /// Opaque value owned by the user-mode implementation.
    pub continuation_context: u64,
    pub directory_name: Cow<'a, U16Str>,
    pub search_pattern: Option<Cow<'a, U16Str>>,
}

fn wide_bytes(s: &U16Str) -> &[u8] {
    bytemuck::cast_slice(s.as_slice())
}

fn wide_from_bytes(bytes: &[u8]) -> Result<U16String> {
    if bytes.len() % 2 != 0 {
        return Err(BridgeError::MalformedMessage("odd UTF-16 byte length"));
    }
    let mut wide = Vec::new();
    wide.try_reserve_exact(bytes.len() / 2)?;
    wide.extend(
        bytes
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]])),
    );
    Ok(U16String::from_vec(wide))
}

impl EnumerationRequest<'_> {
    /// Whether the caller asked for a single entry only.
    pub fn return_single_entry(&self) -> bool {
        QueryFlag::ReturnSingleEntry.is_flagged(self.flags)
    }

    fn name_length(&self) -> usize {
        wide_bytes(&self.directory_name).len()
    }

    fn pattern_length(&self) -> usize {
        self.search_pattern
            .as_deref()
            .map_or(0, |p| wide_bytes(p).len())
    }

    /// Header plus name plus pattern.
    pub fn encoded_len(&self) -> usize {
        QUERY_HEADER_SIZE + self.name_length() + self.pattern_length()
    }

    /// Pack the request. The pattern, if any, immediately follows the name and its offset
    /// within the payload is recorded in the header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = self.encoded_len();
        let size_u32 = u32::try_from(size).map_err(|_| BridgeError::ResourceExhausted)?;
        let name_length = self.name_length();
        let pattern_length = self.pattern_length();

        let mut message = allocate_message(size)?;
        let header = QueryHeader {
            size: size_u32,
            flags: self.flags as u32,
            correlation_id: self.correlation_id.0,
            continuation_context: self.continuation_context,
            process_id: self.process_id,
            information_class: self.information_class.0,
            buffer_length: self.buffer_length,
            cursor: self.cursor,
            directory_name_length: name_length as u32,
            search_pattern_length: pattern_length as u32,
            search_pattern_offset: if pattern_length > 0 {
                name_length as u32
            } else {
                0
            },
            reserved: 0,
        };
        message[..QUERY_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));

        let payload = &mut message[QUERY_HEADER_SIZE..];
        payload[..name_length].copy_from_slice(wide_bytes(&self.directory_name));
        if let Some(pattern) = self.search_pattern.as_deref() {
            payload[name_length..].copy_from_slice(wide_bytes(pattern));
        }
        Ok(message)
    }

    /// Unpack a request, validating every length against the message size first.
    pub fn decode(message: &[u8]) -> Result<EnumerationRequest<'static>> {
        let header: QueryHeader = read_header(message, |h: &QueryHeader| h.size)?;
        let payload = &message[QUERY_HEADER_SIZE..];

        let name_length = header.directory_name_length as usize;
        let pattern_length = header.search_pattern_length as usize;
        if name_length
            .checked_add(pattern_length)
            .map_or(true, |n| n != payload.len())
        {
            return Err(BridgeError::MalformedMessage(
                "name and pattern lengths do not add up to the payload",
            ));
        }

        let directory_name = wide_from_bytes(&payload[..name_length])?;
        let search_pattern = if pattern_length > 0 {
            let offset = header.search_pattern_offset as usize;
            if offset < name_length
                || offset
                    .checked_add(pattern_length)
                    .map_or(true, |end| end > payload.len())
            {
                return Err(BridgeError::MalformedMessage(
                    "search pattern offset out of bounds",
                ));
            }
            Some(Cow::Owned(wide_from_bytes(
                &payload[offset..offset + pattern_length],
            )?))
        } else {
            None
        };

        Ok(EnumerationRequest {
            correlation_id: CorrelationId(header.correlation_id),
            flags: header.flags as u8,
            process_id: header.process_id,
            information_class: InformationClass(header.information_class),
            buffer_length: header.buffer_length,
            cursor: header.cursor,
            continuation_context: header.continuation_context,
            directory_name: Cow::Owned(directory_name),
            search_pattern,
        })
    }
}
