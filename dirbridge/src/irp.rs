//! The directory-control request as handed to the bridge, and the caller's side of its resolution.
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use widestring::U16String;

use crate::constants::{
    InformationClass, IRP_MN_NOTIFY_CHANGE_DIRECTORY, IRP_MN_QUERY_DIRECTORY, SL_WATCH_TREE,
};
use crate::error::NtStatus;
use crate::filesystem::FileHandleContext;
use crate::util::IoBuffer;

/// Final status and transferred byte count of a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IoStatusBlock {
    pub status: NtStatus,
    pub information: u32,
}

impl IoStatusBlock {
    pub fn new(status: NtStatus, information: u32) -> Self {
        Self {
            status,
            information,
        }
    }
}

/// The bridge's half of the original call; resolves the caller exactly once.
///
/// Dropping an unresolved completion resolves the caller with `STATUS_CANCELLED`, so the caller
/// never waits forever on a request the bridge has lost track of.
#[derive(Debug)]
pub struct IrpCompletion(Option<oneshot::Sender<IoStatusBlock>>);

impl IrpCompletion {
    /// Resolve the original call.
    pub fn complete(mut self, status: NtStatus, information: u32) {
        self.send(IoStatusBlock::new(status, information));
    }

    fn send(&mut self, iosb: IoStatusBlock) {
        if let Some(tx) = self.0.take() {
            if tx.send(iosb).is_err() {
                tracing::debug!(status = %iosb.status, "caller went away before completion");
            }
        }
    }
}

impl Drop for IrpCompletion {
    fn drop(&mut self) {
        if self.0.is_some() {
            tracing::warn!("completion dropped unresolved, cancelling the original call");
            self.send(IoStatusBlock::new(NtStatus::CANCELLED, 0));
        }
    }
}

/// The caller's half of the original call.
///
/// `PendingIo` is a future resolving to the final [`IoStatusBlock`]; synchronous callers can use
/// [`wait`](Self::wait) instead.
#[derive(Debug)]
pub struct PendingIo(oneshot::Receiver<IoStatusBlock>);

impl PendingIo {
    /// Create a linked completion/pending pair.
    pub fn channel() -> (IrpCompletion, PendingIo) {
        let (tx, rx) = oneshot::channel();
        (IrpCompletion(Some(tx)), PendingIo(rx))
    }

    /// The result, if the call has been resolved already.
    pub fn try_result(&mut self) -> Option<IoStatusBlock> {
        match self.0.try_recv() {
            Ok(iosb) => Some(iosb),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(IoStatusBlock::new(NtStatus::CANCELLED, 0))
            }
        }
    }

    /// Block the current thread until the call is resolved.
    ///
    /// # Panics
    /// Panics when called from within an asynchronous execution context.
    pub fn wait(self) -> IoStatusBlock {
        self.0
            .blocking_recv()
            .unwrap_or(IoStatusBlock::new(NtStatus::CANCELLED, 0))
    }
}

impl Future for PendingIo {
    type Output = IoStatusBlock;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|r| r.unwrap_or(IoStatusBlock::new(NtStatus::CANCELLED, 0)))
    }
}

/// The caller's destination buffer.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    pub(crate) buffer: IoBuffer,
    pub(crate) mapped: bool,
}

impl OutputBuffer {
    /// A buffer only addressable from the issuing context; the bridge pins it before submission.
    pub fn user(buffer: IoBuffer) -> Self {
        Self {
            buffer,
            mapped: false,
        }
    }

    /// A buffer the I/O layer already made addressable from any context.
    pub fn mapped(buffer: IoBuffer) -> Self {
        Self {
            buffer,
            mapped: true,
        }
    }

    pub fn buffer(&self) -> &IoBuffer {
        &self.buffer
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}

/// Operation parameters of the request, interpreted according to the minor function.
#[derive(Debug, Clone, Default)]
pub struct StackParameters {
    /// Requested output length.
    pub length: u32,
    /// Search pattern of a query.
    pub file_name: Option<U16String>,
    pub information_class: InformationClass,
    /// Explicit resume index of a query.
    pub file_index: u32,
    /// Completion filter of a change notification.
    pub completion_filter: u32,
}

/// A directory-control request.
#[derive(Debug)]
pub struct DirectoryControlRequest {
    pub minor_function: u8,
    /// Stack-location flags.
    pub flags: u8,
    pub parameters: StackParameters,
    /// The handle context of the file object the request targets.
    pub handle: Option<Arc<FileHandleContext>>,
    pub output: Option<OutputBuffer>,
    /// Requestor process.
    pub process_id: u32,
    pub(crate) completion: IrpCompletion,
}

impl DirectoryControlRequest {
    /// Create a request for an arbitrary minor function.
    pub fn new(
        minor_function: u8,
        flags: u8,
        parameters: StackParameters,
        handle: Option<Arc<FileHandleContext>>,
        output: Option<OutputBuffer>,
    ) -> (Self, PendingIo) {
        let (completion, pending) = PendingIo::channel();
        (
            Self {
                minor_function,
                flags,
                parameters,
                handle,
                output,
                process_id: std::process::id(),
                completion,
            },
            pending,
        )
    }

    /// Create a query-directory request.
    pub fn query_directory(
        handle: &Arc<FileHandleContext>,
        information_class: InformationClass,
        pattern: Option<&str>,
        flags: u8,
        file_index: u32,
        output: OutputBuffer,
    ) -> (Self, PendingIo) {
        let parameters = StackParameters {
            length: output.buffer.len() as u32,
            file_name: pattern.map(U16String::from_str),
            information_class,
            file_index,
            completion_filter: 0,
        };
        Self::new(
            IRP_MN_QUERY_DIRECTORY,
            flags,
            parameters,
            Some(handle.clone()),
            Some(output),
        )
    }

    /// Create a notify-change-directory request.
    pub fn notify_change_directory(
        handle: &Arc<FileHandleContext>,
        completion_filter: u32,
        watch_tree: bool,
        output: Option<OutputBuffer>,
    ) -> (Self, PendingIo) {
        let parameters = StackParameters {
            length: output.as_ref().map_or(0, |o| o.buffer.len() as u32),
            completion_filter,
            ..Default::default()
        };
        Self::new(
            IRP_MN_NOTIFY_CHANGE_DIRECTORY,
            if watch_tree { SL_WATCH_TREE } else { 0 },
            parameters,
            Some(handle.clone()),
            output,
        )
    }

    /// Resolve the request immediately.
    pub(crate) fn complete(self, status: NtStatus, information: u32) {
        self.completion.complete(status, information)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_resolves_once() {
        let (completion, mut pending) = PendingIo::channel();
        assert_eq!(pending.try_result(), None);
        completion.complete(NtStatus::SUCCESS, 12);
        assert_eq!(
            pending.try_result(),
            Some(IoStatusBlock::new(NtStatus::SUCCESS, 12))
        );
    }

    #[test]
    fn dropped_completion_cancels_the_caller() {
        let (completion, pending) = PendingIo::channel();
        drop(completion);
        assert_eq!(pending.wait(), IoStatusBlock::new(NtStatus::CANCELLED, 0));
    }

    #[tokio::test]
    async fn pending_io_is_a_future() {
        let (completion, pending) = PendingIo::channel();
        tokio::spawn(async move { completion.complete(NtStatus::NO_MORE_FILES, 0) });
        assert_eq!(pending.await.status, NtStatus::NO_MORE_FILES);
    }
}
