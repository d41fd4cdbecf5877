use std::sync::Arc;

use widestring::U16String;

use crate::constants::SL_WATCH_TREE;
use crate::error::{BridgeError, NtStatus, Result};
use crate::filesystem::{FileHandleContext, HandleId};
use crate::irp::{DirectoryControlRequest, IrpCompletion};
use crate::util::{BufferAccess, BufferPin, PinBudget};

/// A parked change-notification call.
#[derive(Debug)]
pub struct NotifyRegistration {
    pub handle: HandleId,
    /// Directory being watched.
    pub path: U16String,
    pub watch_tree: bool,
    pub completion_filter: u32,
    /// Where change records are written when the registration fires.
    pub output: Option<BufferAccess>,
    pub buffer_length: u32,
    pub(crate) completion: IrpCompletion,
}

/// The per-volume list of parked change notifications.
///
/// Implementations own the registered completions and resolve each exactly once, when a
/// matching change is reported, when the handle is cleaned up or when it is cancelled.
pub trait NotifyList: Send + Sync {
    /// Park a change notification.
    fn register(&self, registration: NotifyRegistration);

    /// Resolve every registration of `handle` with `STATUS_NOTIFY_CLEANUP`.
    fn cleanup(&self, handle: HandleId) -> usize;

    /// Resolve every registration of `handle` with `STATUS_CANCELLED`.
    fn cancel(&self, handle: HandleId) -> usize;
}

/// Registers change notifications on directory handles.
pub struct NotifyHandler<'a> {
    pin_budget: &'a Arc<PinBudget>,
    notify_list: &'a dyn NotifyList,
}

impl<'a> NotifyHandler<'a> {
    pub fn new(pin_budget: &'a Arc<PinBudget>, notify_list: &'a dyn NotifyList) -> Self {
        Self {
            pin_budget,
            notify_list,
        }
    }

    /// Park the request on the notify list. The caller stays pending until the list resolves it.
    ///
    /// A handle cleaned up after the request was dispatched resolves the caller with
    /// `STATUS_NOTIFY_CLEANUP` instead.
    pub fn handle(&self, request: DirectoryControlRequest) -> Result<HandleId> {
        let (handle, output) = match self.prepare(&request) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(error = %e, "notify change directory refused");
                request.complete(e.to_ntstatus(), 0);
                return Err(e);
            }
        };

        let DirectoryControlRequest {
            flags,
            parameters,
            completion,
            ..
        } = request;
        let watch_tree = flags & SL_WATCH_TREE != 0;
        let node = handle.node();
        {
            let _node = node.read();
            if handle.is_cleaned_up() {
                tracing::debug!(handle = %handle.id(), "change notification after cleanup");
                if let Some(output) = output {
                    output.release();
                }
                completion.complete(NtStatus::NOTIFY_CLEANUP, 0);
                return Err(BridgeError::Status(NtStatus::NOTIFY_CLEANUP));
            }
            self.notify_list.register(NotifyRegistration {
                handle: handle.id(),
                path: node.name().to_ustring(),
                watch_tree,
                completion_filter: parameters.completion_filter,
                output,
                buffer_length: parameters.length,
                completion,
            });
        }
        tracing::debug!(
            handle = %handle.id(),
            directory = %node.name().display(),
            watch_tree,
            filter = parameters.completion_filter,
            "change notification registered"
        );
        Ok(handle.id())
    }

    fn prepare(
        &self,
        request: &DirectoryControlRequest,
    ) -> Result<(Arc<FileHandleContext>, Option<BufferAccess>)> {
        let handle = request
            .handle
            .as_ref()
            .ok_or(BridgeError::InvalidArgument("file object has no handle context"))?;
        if !handle.node().is_directory() {
            return Err(BridgeError::NotADirectory);
        }

        let length = request.parameters.length;
        let output = match &request.output {
            Some(output) if output.mapped => Some(BufferAccess::Mapped(output.buffer.clone())),
            Some(output) => Some(BufferAccess::Pinned(BufferPin::new(
                &output.buffer,
                length,
                self.pin_budget,
            )?)),
            None => None,
        };
        Ok((handle.clone(), output))
    }
}
