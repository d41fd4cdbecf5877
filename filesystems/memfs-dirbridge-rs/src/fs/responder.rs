use std::sync::Arc;

use tokio::task::JoinHandle;

use dirbridge::host::{CompletionOutcome, DirectoryControlHost, EventReceiver};

use crate::fs::memfs::MemFs;

/// Serve enumeration requests from `events` until the queue closes.
///
/// The task resolves to the number of requests answered.
pub fn spawn_responder(
    fs: Arc<MemFs>,
    host: Arc<DirectoryControlHost>,
    mut events: EventReceiver,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut served = 0;
        while let Some(request) = events.recv().await {
            let request = match request {
                Ok(request) => request,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable request");
                    continue;
                }
            };
            let answer = fs.answer(&request);
            match host.complete_directory(&answer) {
                CompletionOutcome::Resolved(iosb) => {
                    tracing::trace!(
                        correlation_id = %request.correlation_id,
                        status = %iosb.status,
                        information = iosb.information,
                        "answered"
                    );
                    served += 1;
                }
                CompletionOutcome::Stale => {
                    tracing::debug!(correlation_id = %request.correlation_id, "caller gone");
                }
            }
        }
        served
    })
}
