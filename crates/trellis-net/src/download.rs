//! In-flight downloads.
//!
//! A download is split in two halves: the [`PendingDownload`] held by whoever
//! asked for the resource, and the [`DownloadCompleter`] held by whoever
//! produces it. Both share a [`DownloadHandle`] used for cancellation and
//! status queries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use tracing::{debug, trace};
use url::Url;

use crate::{NetError, Request, Response};

/// Unique identifier for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DownloadId(u64);

impl DownloadId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

/// Download state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Download is in progress.
    InProgress,
    /// Download finished, successfully or not.
    Completed,
    /// Cancellation was requested before completion.
    Cancelled,
}

#[derive(Debug, Default)]
struct Shared {
    completed: AtomicBool,
    cancelled: AtomicBool,
    cancel_signal: Notify,
}

/// Shared view of a download.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    id: DownloadId,
    url: Url,
    shared: Arc<Shared>,
}

impl DownloadHandle {
    fn new(url: Url) -> Self {
        Self {
            id: DownloadId::new(),
            url,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Download ID.
    pub fn id(&self) -> DownloadId {
        self.id
    }

    /// Requested URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the result has been delivered.
    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Current state.
    pub fn state(&self) -> DownloadState {
        if self.is_completed() {
            DownloadState::Completed
        } else if self.is_cancelled() {
            DownloadState::Cancelled
        } else {
            DownloadState::InProgress
        }
    }

    /// Request cancellation. Best-effort: a producer may still complete.
    ///
    /// Returns `false` if the download had already completed.
    pub fn cancel(&self) -> bool {
        if self.is_completed() {
            return false;
        }
        if !self.shared.cancelled.swap(true, Ordering::AcqRel) {
            debug!(id = self.id.raw(), url = %self.url, "Download cancelled");
            self.shared.cancel_signal.notify_one();
        }
        true
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.shared.cancel_signal.notified().await;
        }
    }
}

/// Consumer half of a download.
#[derive(Debug)]
pub struct PendingDownload {
    handle: DownloadHandle,
    receiver: oneshot::Receiver<Result<Response, NetError>>,
}

impl PendingDownload {
    /// Create a linked pending download and completer for `request`.
    pub fn new(request: &Request) -> (Self, DownloadCompleter) {
        let handle = DownloadHandle::new(request.url.clone());
        let (sender, receiver) = oneshot::channel();
        let completer = DownloadCompleter {
            handle: handle.clone(),
            sender,
        };
        (Self { handle, receiver }, completer)
    }

    /// A download that has already finished with `result`.
    pub fn ready(request: &Request, result: Result<Response, NetError>) -> Self {
        let (pending, completer) = Self::new(request);
        completer.complete(result);
        pending
    }

    /// Handle for status and cancellation.
    pub fn handle(&self) -> DownloadHandle {
        self.handle.clone()
    }

    /// Wait for the result.
    ///
    /// A producer dropped without completing counts as a cancellation.
    pub async fn result(self) -> Result<Response, NetError> {
        self.receiver.await.unwrap_or(Err(NetError::Cancelled))
    }
}

/// Producer half of a download.
#[derive(Debug)]
pub struct DownloadCompleter {
    handle: DownloadHandle,
    sender: oneshot::Sender<Result<Response, NetError>>,
}

impl DownloadCompleter {
    /// Handle for status queries.
    pub fn handle(&self) -> &DownloadHandle {
        &self.handle
    }

    /// Deliver the result. Returns `false` if nobody is waiting any more.
    pub fn complete(self, result: Result<Response, NetError>) -> bool {
        self.handle.shared.completed.store(true, Ordering::Release);
        trace!(
            id = self.handle.id.raw(),
            ok = result.is_ok(),
            "Download completed"
        );
        self.sender.send(result).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request() -> Request {
        Request::get(Url::parse("https://example.com/video.mp4").unwrap())
    }

    #[test]
    fn test_download_id_uniqueness() {
        assert_ne!(DownloadId::new(), DownloadId::new());
    }

    #[tokio::test]
    async fn test_completer_delivers_result() {
        let req = request();
        let (pending, completer) = PendingDownload::new(&req);
        let handle = pending.handle();
        assert_eq!(handle.state(), DownloadState::InProgress);

        let response = Response::new(req.id, req.url.clone(), None, Bytes::from_static(b"x"));
        assert!(completer.complete(Ok(response)));
        assert!(handle.is_completed());

        let response = pending.result().await.unwrap();
        assert_eq!(response.bytes().as_ref(), b"x");
    }

    #[tokio::test]
    async fn test_cancel_before_completion() {
        let (pending, completer) = PendingDownload::new(&request());
        let handle = pending.handle();

        assert!(handle.cancel());
        assert!(handle.is_cancelled());
        assert_eq!(handle.state(), DownloadState::Cancelled);
        handle.cancelled().await;

        drop(completer);
        assert!(matches!(pending.result().await, Err(NetError::Cancelled)));
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let pending = PendingDownload::ready(&request(), Err(NetError::Blocked));
        let handle = pending.handle();
        assert!(!handle.cancel());
        assert!(!handle.is_cancelled());
        assert_eq!(handle.state(), DownloadState::Completed);
    }
}
