use std::sync::Arc;

use crate::error::Result;
use crate::filesystem::{
    FileHandleContext, FileNodeContext, NotifyHandler, NotifyList, QueryHandler,
};
use crate::host::{
    CompletionHandler, CompletionOutcome, Dispatched, HostParams, PendingRequestRegistry,
    RequestDispatcher, RequestTransport,
};
use crate::irp::DirectoryControlRequest;
use crate::protocol::{CorrelationId, EnumerationAnswer};
use crate::util::PinBudget;

/// Owns the directory-control state of one mounted volume.
///
/// `DirectoryControlHost` is `Send + Sync` and is meant to be shared between the contexts issuing
/// requests and the context delivering answers from user mode.
pub struct DirectoryControlHost {
    params: HostParams,
    pin_budget: Arc<PinBudget>,
    registry: PendingRequestRegistry,
    notify_list: Arc<dyn NotifyList>,
}

impl DirectoryControlHost {
    /// Create a host that submits enumerations through `transport` and parks change
    /// notifications on `notify_list`.
    pub fn new<T: RequestTransport + 'static>(
        params: HostParams,
        transport: T,
        notify_list: Arc<dyn NotifyList>,
    ) -> Self {
        tracing::debug!(
            volume_id = params.volume_id,
            max_message_length = params.max_message_length,
            "directory control host created"
        );
        Self {
            pin_budget: Arc::new(PinBudget::new(params.max_pinned_bytes)),
            registry: PendingRequestRegistry::new(transport),
            notify_list,
            params,
        }
    }

    pub fn params(&self) -> &HostParams {
        &self.params
    }

    /// Open a handle on `node` for this host's volume.
    pub fn open(&self, node: &Arc<FileNodeContext>) -> Arc<FileHandleContext> {
        FileHandleContext::open(node, self.params.volume_id)
    }

    /// Serve a directory-control request.
    pub fn dispatch(&self, request: DirectoryControlRequest) -> Result<Dispatched> {
        RequestDispatcher::new(
            &self.params,
            QueryHandler::new(&self.params, &self.pin_budget, &self.registry),
            NotifyHandler::new(&self.pin_budget, self.notify_list.as_ref()),
        )
        .dispatch(request)
    }

    /// Deliver an answer from user mode.
    pub fn complete_directory(&self, answer: &EnumerationAnswer) -> CompletionOutcome {
        CompletionHandler::new(&self.registry).complete(answer)
    }

    /// Deliver a raw answer message from user mode.
    pub fn complete_directory_raw(&self, message: &[u8]) -> Result<CompletionOutcome> {
        CompletionHandler::new(&self.registry).complete_raw(message)
    }

    /// Cancel an outstanding enumeration. Returns whether this call resolved it.
    pub fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.registry.cancel(correlation_id)
    }

    /// Cancel the parked change notifications of `handle`.
    pub fn cancel_notifications(&self, handle: &FileHandleContext) -> usize {
        self.notify_list.cancel(handle.id())
    }

    /// Clean up a handle whose last user reference is gone.
    ///
    /// Further requests on the handle are refused, outstanding enumerations are cancelled and
    /// parked change notifications are resolved with `STATUS_NOTIFY_CLEANUP`.
    pub fn cleanup(&self, handle: &FileHandleContext) {
        if !handle.mark_cleaned_up() {
            return;
        }
        let cancelled = self.registry.cancel_handle(handle.id());
        let notifications = self.notify_list.cleanup(handle.id());
        tracing::debug!(
            handle = %handle.id(),
            cancelled,
            notifications,
            "handle cleaned up"
        );
    }

    /// Outstanding enumerations.
    pub fn pending(&self) -> &PendingRequestRegistry {
        &self.registry
    }

    /// Output bytes currently pinned on behalf of pending requests.
    pub fn pinned_bytes(&self) -> u64 {
        self.pin_budget.in_use()
    }
}

impl std::fmt::Debug for DirectoryControlHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryControlHost")
            .field("params", &self.params)
            .field("registry", &self.registry)
            .field("pinned_bytes", &self.pinned_bytes())
            .finish_non_exhaustive()
    }
}
