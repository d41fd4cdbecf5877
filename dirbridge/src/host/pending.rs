use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, NtStatus, Result};
use crate::filesystem::{FileHandleContext, HandleId};
use crate::host::RequestTransport;
use crate::irp::IrpCompletion;
use crate::protocol::CorrelationId;
use crate::util::BufferAccess;

/// Lifecycle of a submitted request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestState {
    Submitted,
    AwaitingAnswer,
    Completed,
    Cancelled,
    Failed,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Cancelled | RequestState::Failed
        )
    }
}

/// A packed request ready to be handed to user mode.
#[derive(Debug)]
pub struct PendingSubmission {
    pub correlation_id: CorrelationId,
    pub handle: Arc<FileHandleContext>,
    pub message: Vec<u8>,
    pub access: Option<BufferAccess>,
    /// Capacity of the caller's destination buffer.
    pub buffer_length: u32,
}

/// The original caller's record while its request is outstanding.
pub struct PendingRequestEntry {
    pub(crate) correlation_id: CorrelationId,
    pub(crate) handle: Arc<FileHandleContext>,
    pub(crate) access: Option<BufferAccess>,
    pub(crate) buffer_length: u32,
    pub(crate) completion: IrpCompletion,
    pub(crate) state: RequestState,
}

impl PendingRequestEntry {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Release the buffer and resolve the caller.
    pub(crate) fn resolve(self, status: NtStatus, information: u32) {
        if let Some(access) = self.access {
            access.release();
        }
        self.completion.complete(status, information);
    }
}

impl fmt::Debug for PendingRequestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequestEntry")
            .field("correlation_id", &self.correlation_id)
            .field("handle", &self.handle.id())
            .field("buffer_length", &self.buffer_length)
            .field("state", &self.state)
            .finish()
    }
}

/// Outstanding requests keyed by correlation id.
///
/// Removal from the table is the claim: completion and cancellation both go through
/// [`claim`](Self::claim), and only the caller that removes an entry acts on it.
pub struct PendingRequestRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<CorrelationId, PendingRequestEntry>>,
    transport: Box<dyn RequestTransport>,
}

impl PendingRequestRegistry {
    pub fn new<T: RequestTransport + 'static>(transport: T) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            transport: Box::new(transport),
        }
    }

    /// Reserve a fresh correlation id.
    pub fn allocate_id(&self) -> CorrelationId {
        CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Record the caller and hand the message to user mode.
    ///
    /// On transport failure the entry is failed, its buffer released and the caller resolved with
    /// the error before it is returned. A handle cleaned up before the entry was recorded gets
    /// the request cancelled without it ever reaching user mode.
    pub fn submit(
        &self,
        submission: PendingSubmission,
        completion: IrpCompletion,
    ) -> Result<CorrelationId> {
        let PendingSubmission {
            correlation_id,
            handle,
            message,
            access,
            buffer_length,
        } = submission;

        let owner = Arc::clone(&handle);
        self.entries.lock().insert(
            correlation_id,
            PendingRequestEntry {
                correlation_id,
                handle,
                access,
                buffer_length,
                completion,
                state: RequestState::Submitted,
            },
        );

        // cleanup flags the handle before sweeping the table
        if owner.is_cleaned_up() {
            if let Some(entry) = self.claim(correlation_id, RequestState::Cancelled) {
                tracing::debug!(%correlation_id, "handle cleaned up before submission");
                entry.resolve(BridgeError::Cancelled.to_ntstatus(), 0);
            }
            return Err(BridgeError::Cancelled);
        }

        let length = message.len();
        if let Err(e) = self.transport.submit(message) {
            tracing::warn!(%correlation_id, error = %e, "request submission failed");
            if let Some(entry) = self.claim(correlation_id, RequestState::Failed) {
                entry.resolve(e.to_ntstatus(), 0);
            }
            return Err(e);
        }

        if let Some(entry) = self.entries.lock().get_mut(&correlation_id) {
            if entry.state == RequestState::Submitted {
                entry.state = RequestState::AwaitingAnswer;
            }
        }
        tracing::debug!(%correlation_id, length, "request pending");
        Ok(correlation_id)
    }

    /// Remove the entry for `correlation_id`, moving it into `terminal`.
    ///
    /// Returns `None` if the entry was already claimed.
    pub(crate) fn claim(
        &self,
        correlation_id: CorrelationId,
        terminal: RequestState,
    ) -> Option<PendingRequestEntry> {
        debug_assert!(terminal.is_terminal());
        let mut entry = self.entries.lock().remove(&correlation_id)?;
        entry.state = terminal;
        Some(entry)
    }

    /// Cancel one outstanding request. Returns whether this call resolved it.
    pub fn cancel(&self, correlation_id: CorrelationId) -> bool {
        match self.claim(correlation_id, RequestState::Cancelled) {
            Some(entry) => {
                tracing::debug!(%correlation_id, "request cancelled");
                entry.resolve(BridgeError::Cancelled.to_ntstatus(), 0);
                true
            }
            None => false,
        }
    }

    /// Cancel every outstanding request issued on `handle`.
    pub fn cancel_handle(&self, handle: HandleId) -> usize {
        let claimed: Vec<PendingRequestEntry> = {
            let mut entries = self.entries.lock();
            let ids: Vec<CorrelationId> = entries
                .values()
                .filter(|e| e.handle.id() == handle)
                .map(|e| e.correlation_id)
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id))
                .collect()
        };
        let count = claimed.len();
        for mut entry in claimed {
            entry.state = RequestState::Cancelled;
            entry.resolve(BridgeError::Cancelled.to_ntstatus(), 0);
        }
        if count > 0 {
            tracing::debug!(%handle, count, "cancelled pending requests of handle");
        }
        count
    }

    /// The state of an outstanding request, `None` once it has been resolved.
    pub fn state(&self, correlation_id: CorrelationId) -> Option<RequestState> {
        self.entries.lock().get(&correlation_id).map(|e| e.state)
    }

    /// The number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PendingRequestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequestRegistry")
            .field("outstanding", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileNodeContext, NodeKind};
    use crate::host::{event_channel, MockRequestTransport};
    use crate::irp::{IoStatusBlock, PendingIo};
    use crate::util::{BufferPin, IoBuffer, PinBudget};

    fn submission(
        registry: &PendingRequestRegistry,
        handle: &Arc<FileHandleContext>,
        pin: Option<BufferPin>,
    ) -> PendingSubmission {
        PendingSubmission {
            correlation_id: registry.allocate_id(),
            handle: handle.clone(),
            message: vec![0; 8],
            access: pin.map(BufferAccess::Pinned),
            buffer_length: 16,
        }
    }

    #[test]
    fn submit_then_cancel_releases_pin_once() {
        let (tx, mut rx) = event_channel();
        let registry = PendingRequestRegistry::new(tx);
        let node = FileNodeContext::with_name("\\d", NodeKind::Directory);
        let handle = FileHandleContext::open(&node, 0);
        let budget = Arc::new(PinBudget::new(u64::MAX));
        let buffer = IoBuffer::new(16);
        let pin = BufferPin::new(&buffer, 16, &budget).unwrap();

        let (completion, mut pending) = PendingIo::channel();
        let id = registry
            .submit(submission(&registry, &handle, Some(pin)), completion)
            .unwrap();
        assert_eq!(registry.state(id), Some(RequestState::AwaitingAnswer));
        assert_eq!(rx.try_recv_raw(), Some(vec![0; 8]));
        assert_eq!(buffer.pin_count(), 1);

        assert!(registry.cancel(id));
        assert!(!registry.cancel(id));
        assert_eq!(buffer.pin_count(), 0);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(registry.state(id), None);
        assert_eq!(
            pending.try_result(),
            Some(IoStatusBlock::new(NtStatus::CANCELLED, 0))
        );
    }

    #[test]
    fn transport_failure_fails_the_request() {
        let mut transport = MockRequestTransport::new();
        transport
            .expect_submit()
            .times(1)
            .returning(|_| Err(BridgeError::ResourceExhausted));
        let registry = PendingRequestRegistry::new(transport);
        let node = FileNodeContext::with_name("\\d", NodeKind::Directory);
        let handle = FileHandleContext::open(&node, 0);
        let budget = Arc::new(PinBudget::new(u64::MAX));
        let buffer = IoBuffer::new(16);
        let pin = BufferPin::new(&buffer, 16, &budget).unwrap();

        let (completion, mut pending) = PendingIo::channel();
        let err = registry
            .submit(submission(&registry, &handle, Some(pin)), completion)
            .unwrap_err();
        assert_eq!(err, BridgeError::ResourceExhausted);
        assert!(registry.is_empty());
        assert_eq!(buffer.pin_count(), 0);
        assert_eq!(
            pending.try_result(),
            Some(IoStatusBlock::new(NtStatus::INSUFFICIENT_RESOURCES, 0))
        );
    }

    #[test]
    fn submission_on_cleaned_up_handle_is_cancelled() {
        let mut transport = MockRequestTransport::new();
        transport.expect_submit().never();
        let registry = PendingRequestRegistry::new(transport);
        let node = FileNodeContext::with_name("\\d", NodeKind::Directory);
        let handle = FileHandleContext::open(&node, 0);
        let budget = Arc::new(PinBudget::new(u64::MAX));
        let buffer = IoBuffer::new(16);
        let pin = BufferPin::new(&buffer, 16, &budget).unwrap();
        assert!(handle.mark_cleaned_up());

        let (completion, mut pending) = PendingIo::channel();
        let err = registry
            .submit(submission(&registry, &handle, Some(pin)), completion)
            .unwrap_err();
        assert_eq!(err, BridgeError::Cancelled);
        assert!(registry.is_empty());
        assert_eq!(buffer.pin_count(), 0);
        assert_eq!(budget.in_use(), 0);
        assert_eq!(
            pending.try_result(),
            Some(IoStatusBlock::new(NtStatus::CANCELLED, 0))
        );
    }

    #[test]
    fn cancel_handle_only_touches_that_handle() {
        let (tx, _rx) = event_channel();
        let registry = PendingRequestRegistry::new(tx);
        let node = FileNodeContext::with_name("\\d", NodeKind::Directory);
        let a = FileHandleContext::open(&node, 0);
        let b = FileHandleContext::open(&node, 0);

        let mut waiters = Vec::new();
        for handle in [&a, &a, &b] {
            let (completion, pending) = PendingIo::channel();
            registry
                .submit(submission(&registry, handle, None), completion)
                .unwrap();
            waiters.push(pending);
        }

        assert_eq!(registry.cancel_handle(a.id()), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(
            waiters[0].try_result().map(|r| r.status),
            Some(NtStatus::CANCELLED)
        );
        assert_eq!(waiters[2].try_result(), None);
    }
}
