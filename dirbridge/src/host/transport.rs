use tokio::sync::mpsc;

use crate::error::{BridgeError, NtStatus, Result};
use crate::protocol::EnumerationRequest;

/// The channel that carries packed requests to the user-mode file system.
///
/// Once `submit` returns `Ok`, delivery is the transport's concern; the answer comes back
/// through [`DirectoryControlHost::complete_directory`](crate::host::DirectoryControlHost::complete_directory).
#[cfg_attr(test, mockall::automock)]
pub trait RequestTransport: Send + Sync {
    /// Hand one packed message to user mode.
    fn submit(&self, message: Vec<u8>) -> Result<()>;
}

/// Create an in-process request queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), EventReceiver(rx))
}

/// Kernel-side end of the request queue.
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<Vec<u8>>);

impl RequestTransport for EventSender {
    fn submit(&self, message: Vec<u8>) -> Result<()> {
        self.0
            .send(message)
            .map_err(|_| BridgeError::Status(NtStatus::INVALID_DEVICE_REQUEST))
    }
}

/// User-mode end of the request queue, yielding validated requests.
#[derive(Debug)]
pub struct EventReceiver(mpsc::UnboundedReceiver<Vec<u8>>);

impl EventReceiver {
    /// Wait for the next request. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Result<EnumerationRequest<'static>>> {
        self.0
            .recv()
            .await
            .map(|message| EnumerationRequest::decode(&message))
    }

    /// Block the current thread for the next request.
    pub fn blocking_recv(&mut self) -> Option<Result<EnumerationRequest<'static>>> {
        self.0
            .blocking_recv()
            .map(|message| EnumerationRequest::decode(&message))
    }

    /// The next request, if one is queued.
    pub fn try_recv(&mut self) -> Option<Result<EnumerationRequest<'static>>> {
        self.0
            .try_recv()
            .ok()
            .map(|message| EnumerationRequest::decode(&message))
    }

    /// The next raw message, if one is queued.
    pub fn try_recv_raw(&mut self) -> Option<Vec<u8>> {
        self.0.try_recv().ok()
    }
}
