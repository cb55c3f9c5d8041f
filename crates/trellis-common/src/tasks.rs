//! Deferred asynchronous work.
//!
//! The tree is single-threaded, so sub-resource continuations (imported style
//! sheets, media downloads) are not spawned onto a runtime. They are handed to
//! a scheduler, normally the owning document, which drives them and holds its
//! load event until they settle.

use futures::future::LocalBoxFuture;

/// A unit of deferred work bound to the owning thread.
pub type LocalTask = LocalBoxFuture<'static, ()>;

/// Accepts deferred work.
pub trait TaskScheduler {
    /// Register `task` as pending work that must settle before load completes.
    fn schedule(&self, task: LocalTask);
}
