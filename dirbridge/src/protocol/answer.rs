use crate::error::{BridgeError, NtStatus, Result};
use crate::protocol::{
    allocate_message, read_header, AnswerHeader, CorrelationId, ANSWER_HEADER_SIZE,
};

/// The user-mode file system's answer to an [`EnumerationRequest`](crate::protocol::EnumerationRequest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationAnswer {
    pub correlation_id: CorrelationId,
    /// Forwarded to the original caller verbatim when the answer is accepted.
    pub status: NtStatus,
    /// Answer payload in the requested information class.
    pub buffer: Vec<u8>,
    pub next_cursor: u32,
    pub continuation_context: u64,
}

impl EnumerationAnswer {
    /// The declared answer length.
    pub fn length(&self) -> u32 {
        self.buffer.len() as u32
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let size = ANSWER_HEADER_SIZE + self.buffer.len();
        let size_u32 = u32::try_from(size).map_err(|_| BridgeError::ResourceExhausted)?;
        let mut message = allocate_message(size)?;
        let header = AnswerHeader {
            size: size_u32,
            status: self.status.0,
            correlation_id: self.correlation_id.0,
            continuation_context: self.continuation_context,
            buffer_length: self.buffer.len() as u32,
            next_cursor: self.next_cursor,
        };
        message[..ANSWER_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
        message[ANSWER_HEADER_SIZE..].copy_from_slice(&self.buffer);
        Ok(message)
    }

    pub fn decode(message: &[u8]) -> Result<Self> {
        let header: AnswerHeader = read_header(message, |h: &AnswerHeader| h.size)?;
        let payload = &message[ANSWER_HEADER_SIZE..];
        if header.buffer_length as usize != payload.len() {
            return Err(BridgeError::MalformedMessage(
                "answer length does not match the payload",
            ));
        }
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(payload.len())?;
        buffer.extend_from_slice(payload);
        Ok(EnumerationAnswer {
            correlation_id: CorrelationId(header.correlation_id),
            status: NtStatus(header.status),
            buffer,
            next_cursor: header.next_cursor,
            continuation_context: header.continuation_context,
        })
    }
}
