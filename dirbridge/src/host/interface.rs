use crate::constants::{IRP_MN_NOTIFY_CHANGE_DIRECTORY, IRP_MN_QUERY_DIRECTORY};
use crate::error::{BridgeError, Result};
use crate::filesystem::{HandleId, NotifyHandler, QueryHandler};
use crate::host::HostParams;
use crate::irp::DirectoryControlRequest;
use crate::protocol::CorrelationId;

/// The directory-control operations the bridge serves.
#[repr(usize)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DirectoryOperation {
    Enumerate = 0,
    WatchChanges = 1,
}

impl TryFrom<u8> for DirectoryOperation {
    type Error = BridgeError;

    fn try_from(minor_function: u8) -> Result<Self> {
        match minor_function {
            IRP_MN_QUERY_DIRECTORY => Ok(DirectoryOperation::Enumerate),
            IRP_MN_NOTIFY_CHANGE_DIRECTORY => Ok(DirectoryOperation::WatchChanges),
            other => Err(BridgeError::UnsupportedOperation(other)),
        }
    }
}

/// A request that was accepted and is now pending.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// The enumeration was submitted to user mode under this id.
    Enumerate(CorrelationId),
    /// The change notification was parked for this handle.
    WatchChanges(HandleId),
}

impl Dispatched {
    pub fn operation(&self) -> DirectoryOperation {
        match self {
            Dispatched::Enumerate(_) => DirectoryOperation::Enumerate,
            Dispatched::WatchChanges(_) => DirectoryOperation::WatchChanges,
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Dispatched::Enumerate(id) => Some(*id),
            Dispatched::WatchChanges(_) => None,
        }
    }
}

/// Entry point for directory-control requests.
///
/// The dispatcher checks the handle context and routes the request by minor function. Whatever
/// the outcome, the caller is either left pending (on `Ok`) or already resolved with the status
/// of the returned error.
pub struct RequestDispatcher<'a> {
    params: &'a HostParams,
    query: QueryHandler<'a>,
    notify: NotifyHandler<'a>,
}

impl<'a> RequestDispatcher<'a> {
    pub fn new(params: &'a HostParams, query: QueryHandler<'a>, notify: NotifyHandler<'a>) -> Self {
        Self {
            params,
            query,
            notify,
        }
    }

    pub fn dispatch(&self, request: DirectoryControlRequest) -> Result<Dispatched> {
        let operation = match self.check(&request) {
            Ok(operation) => operation,
            Err(e) => {
                tracing::warn!(
                    minor_function = request.minor_function,
                    error = %e,
                    "directory control refused"
                );
                request.complete(e.to_ntstatus(), 0);
                return Err(e);
            }
        };

        let span = self.params.debug_mode.is_enabled(operation).then(|| {
            tracing::debug_span!(
                "directory_control",
                ?operation,
                handle = ?request.handle.as_ref().map(|h| h.id()),
                process_id = request.process_id,
            )
            .entered()
        });

        let result = match operation {
            DirectoryOperation::Enumerate => self.query.handle(request).map(Dispatched::Enumerate),
            DirectoryOperation::WatchChanges => {
                self.notify.handle(request).map(Dispatched::WatchChanges)
            }
        };
        if span.is_some() {
            match &result {
                Ok(dispatched) => tracing::debug!(?dispatched, "status pending"),
                Err(e) => tracing::debug!(status = %e.to_ntstatus(), "failed"),
            }
        }
        result
    }

    fn check(&self, request: &DirectoryControlRequest) -> Result<DirectoryOperation> {
        let handle = request
            .handle
            .as_ref()
            .ok_or(BridgeError::InvalidArgument("file object has no handle context"))?;
        if !handle.is_valid_for(self.params.volume_id) {
            return Err(BridgeError::InvalidArgument(
                "handle context is stale or belongs to another volume",
            ));
        }
        DirectoryOperation::try_from(request.minor_function)
    }
}
