use std::borrow::Cow;
use std::sync::Arc;

use crate::constants::QueryFlag;
use crate::error::{BridgeError, Result};
use crate::filesystem::FileHandleContext;
use crate::host::{HostParams, PendingRequestRegistry, PendingSubmission};
use crate::irp::DirectoryControlRequest;
use crate::protocol::{CorrelationId, EnumerationRequest};
use crate::util::{BufferAccess, BufferPin, PinBudget};

/// Pick the position an enumeration resumes from.
///
/// An explicit index wins over a restart, which wins over the position the handle remembers.
pub fn resume_cursor(flags: u8, file_index: u32, stored: u32) -> u32 {
    if QueryFlag::IndexSpecified.is_flagged(flags) {
        file_index
    } else if QueryFlag::RestartScan.is_flagged(flags) {
        0
    } else {
        stored
    }
}

/// Forwards directory enumerations to the user-mode file system.
#[derive(Debug)]
pub struct QueryHandler<'a> {
    params: &'a HostParams,
    pin_budget: &'a Arc<PinBudget>,
    registry: &'a PendingRequestRegistry,
}

impl<'a> QueryHandler<'a> {
    pub fn new(
        params: &'a HostParams,
        pin_budget: &'a Arc<PinBudget>,
        registry: &'a PendingRequestRegistry,
    ) -> Self {
        Self {
            params,
            pin_budget,
            registry,
        }
    }

    /// Pack and submit an enumeration request.
    ///
    /// On success the caller stays pending until its answer is completed or it is cancelled.
    /// On failure the caller is resolved with the error status and nothing is left registered.
    pub fn handle(&self, request: DirectoryControlRequest) -> Result<CorrelationId> {
        match self.prepare(&request) {
            Ok(submission) => self.registry.submit(submission, request.completion),
            Err(e) => {
                tracing::warn!(error = %e, "query directory refused");
                request.complete(e.to_ntstatus(), 0);
                Err(e)
            }
        }
    }

    fn prepare(&self, request: &DirectoryControlRequest) -> Result<PendingSubmission> {
        let handle = request
            .handle
            .as_ref()
            .ok_or(BridgeError::InvalidArgument("file object has no handle context"))?;
        let parameters = &request.parameters;
        let information_class = parameters.information_class;

        match information_class.name() {
            Some(name) => tracing::trace!(class = name, "query directory information class"),
            None if self.params.reject_unknown_information_class => {
                return Err(BridgeError::InvalidArgument("unknown information class"));
            }
            None => tracing::debug!(
                class = ?information_class,
                "forwarding unknown information class"
            ),
        }
        for flag in [
            QueryFlag::RestartScan,
            QueryFlag::ReturnSingleEntry,
            QueryFlag::IndexSpecified,
        ] {
            if flag.is_flagged(request.flags) {
                tracing::trace!(?flag, "query flag");
            }
        }

        let access = match &request.output {
            Some(output) => {
                if parameters.length as usize > output.buffer.len() {
                    return Err(BridgeError::InvalidArgument(
                        "requested length exceeds the supplied buffer",
                    ));
                }
                if output.mapped {
                    Some(BufferAccess::Mapped(output.buffer.clone()))
                } else {
                    Some(BufferAccess::Pinned(BufferPin::new(
                        &output.buffer,
                        parameters.length,
                        self.pin_budget,
                    )?))
                }
            }
            None => None,
        };

        let correlation_id = self.registry.allocate_id();
        let message = self.pack(request, handle, correlation_id)?;

        Ok(PendingSubmission {
            correlation_id,
            handle: handle.clone(),
            message,
            access,
            buffer_length: parameters.length,
        })
    }

    /// Build the request under the node lock. The session pattern is committed only once the
    /// message has been built.
    fn pack(
        &self,
        request: &DirectoryControlRequest,
        handle: &FileHandleContext,
        correlation_id: CorrelationId,
    ) -> Result<Vec<u8>> {
        let parameters = &request.parameters;
        let node = handle.node();
        let _node = node.read();
        let mut state = handle.state();
        if handle.is_cleaned_up() {
            return Err(BridgeError::InvalidArgument("handle context has been cleaned up"));
        }

        let mut next = state.clone();
        if next.capture(parameters.file_name.as_deref())? {
            tracing::debug!(
                handle = %handle.id(),
                pattern = ?next.search_pattern().map(|p| p.display().to_string()),
                "initial query of enumeration session"
            );
        }

        let cursor = resume_cursor(request.flags, parameters.file_index, next.cursor());
        let message = {
            let query = EnumerationRequest {
                correlation_id,
                flags: request.flags,
                process_id: if self.params.forward_process_id {
                    request.process_id
                } else {
                    0
                },
                information_class: parameters.information_class,
                buffer_length: parameters.length,
                cursor,
                continuation_context: next.continuation_token(),
                directory_name: Cow::Borrowed(node.name()),
                search_pattern: next.search_pattern().map(Cow::Borrowed),
            };

            let length = query.encoded_len();
            if length > self.params.max_message_length as usize {
                tracing::warn!(
                    length,
                    limit = self.params.max_message_length,
                    "enumeration request too large"
                );
                return Err(BridgeError::ResourceExhausted);
            }
            query.encode()?
        };
        let length = message.len();
        tracing::debug!(
            %correlation_id,
            directory = %node.name().display(),
            cursor,
            length,
            "packed enumeration request"
        );

        *state = next;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_index_beats_restart() {
        let both = QueryFlag::IndexSpecified as u8 | QueryFlag::RestartScan as u8;
        assert_eq!(resume_cursor(both, 5, 9), 5);
        assert_eq!(resume_cursor(QueryFlag::RestartScan as u8, 5, 9), 0);
        assert_eq!(resume_cursor(0, 5, 9), 9);
        assert_eq!(resume_cursor(QueryFlag::ReturnSingleEntry as u8, 5, 9), 9);
    }
}
