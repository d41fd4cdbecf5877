use crate::error::{BridgeError, Result};
use crate::host::{PendingRequestEntry, PendingRequestRegistry, RequestState};
use crate::irp::IoStatusBlock;
use crate::protocol::EnumerationAnswer;
use crate::util::BufferAccess;

/// What became of an answer handed to the [`CompletionHandler`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The answer matched an outstanding request, which is now resolved with this status.
    Resolved(IoStatusBlock),
    /// No outstanding request carries the answer's correlation id. The answer was ignored.
    Stale,
}

/// Delivers user-mode answers to the original callers.
#[derive(Debug)]
pub struct CompletionHandler<'a> {
    registry: &'a PendingRequestRegistry,
}

impl<'a> CompletionHandler<'a> {
    pub fn new(registry: &'a PendingRequestRegistry) -> Self {
        Self { registry }
    }

    /// Match `answer` to its request, copy the payload to the caller and resolve it.
    pub fn complete(&self, answer: &EnumerationAnswer) -> CompletionOutcome {
        let correlation_id = answer.correlation_id;
        let Some(entry) = self.registry.claim(correlation_id, RequestState::Completed) else {
            tracing::debug!(%correlation_id, "stale enumeration answer");
            return CompletionOutcome::Stale;
        };

        let PendingRequestEntry {
            handle,
            access,
            buffer_length,
            completion,
            ..
        } = entry;

        let iosb = match Self::destination(access.as_ref(), buffer_length, answer.length()) {
            Ok(destination) => {
                destination.fill(buffer_length, &answer.buffer);
                {
                    let _node = handle.node().read();
                    handle
                        .state()
                        .apply_answer(answer.next_cursor, answer.continuation_context);
                }
                IoStatusBlock::new(answer.status, answer.length())
            }
            Err(e) => {
                tracing::warn!(%correlation_id, error = %e, "enumeration answer rejected");
                IoStatusBlock::new(e.to_ntstatus(), 0)
            }
        };

        if let Some(access) = access {
            access.release();
        }
        tracing::debug!(
            %correlation_id,
            handle = %handle.id(),
            status = %iosb.status,
            information = iosb.information,
            "enumeration completed"
        );
        completion.complete(iosb.status, iosb.information);
        CompletionOutcome::Resolved(iosb)
    }

    /// Decode a raw answer message, then [`complete`](Self::complete) it.
    ///
    /// A malformed message is refused without touching any outstanding request.
    pub fn complete_raw(&self, message: &[u8]) -> Result<CompletionOutcome> {
        let answer = EnumerationAnswer::decode(message)?;
        Ok(self.complete(&answer))
    }

    fn destination(
        access: Option<&BufferAccess>,
        buffer_length: u32,
        required: u32,
    ) -> Result<&BufferAccess> {
        match access {
            Some(access) if buffer_length > 0 && buffer_length >= required => Ok(access),
            Some(_) => Err(BridgeError::BufferTooSmall {
                required,
                available: buffer_length,
            }),
            None => Err(BridgeError::BufferTooSmall {
                required,
                available: 0,
            }),
        }
    }
}
