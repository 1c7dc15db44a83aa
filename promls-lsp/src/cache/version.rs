//! Per-version cancellation and the outstanding compile counter.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;

use crate::Error;

/// Cancellation signal tied to one version of a document's content.
///
/// Every content update cancels the current context and installs a fresh one. Compile jobs
/// and readers hold a clone and test it before touching the document, so work started for
/// an old version is discarded instead of leaking into the new one.
#[derive(Debug, Clone)]
pub struct VersionContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    version: i32,
    cancelled: AtomicBool,
    /// Compile jobs still running for this version.
    pending: watch::Sender<usize>,
}

impl VersionContext {
    pub(crate) fn new(version: i32) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                version,
                cancelled: AtomicBool::new(false),
                pending,
            }),
        }
    }

    /// Document version this context was created for.
    #[must_use]
    pub fn version(&self) -> i32 {
        self.inner.version
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Stale`] once the context has been cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stale`] if a newer version replaced this one.
    pub fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Stale)
        } else {
            Ok(())
        }
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        // Wake anyone blocked in `wait_compiled`.
        self.inner.pending.send_modify(|_| {});
    }

    pub(crate) fn begin_job(&self) {
        self.inner.pending.send_modify(|pending| *pending += 1);
    }

    /// Mark one job as done. Returns `true` for the job that brought the counter to zero.
    pub(crate) fn finish_job(&self) -> bool {
        let mut drained = false;
        self.inner.pending.send_modify(|pending| {
            *pending = pending.saturating_sub(1);
            drained = *pending == 0;
        });
        drained
    }

    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        *self.inner.pending.borrow()
    }

    /// Wait until every compile job of this version has finished.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stale`] if the context is cancelled before or while waiting.
    pub async fn wait_compiled(&self) -> Result<(), Error> {
        let mut pending = self.inner.pending.subscribe();
        let cancelled = &self.inner.cancelled;
        pending
            .wait_for(|count| *count == 0 || cancelled.load(Ordering::SeqCst))
            .await
            .map_err(|_| Error::Stale)?;
        self.check()
    }

    /// Whether both handles refer to the same version context.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
impl PartialEq for VersionContext {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_makes_context_stale() {
        let ctx = VersionContext::new(3);
        assert_eq!(ctx.version(), 3);
        assert_eq!(ctx.check(), Ok(()));
        ctx.cancel();
        assert_eq!(ctx.check(), Err(Error::Stale));
    }

    #[test]
    fn test_finish_job_reports_drain_once() {
        let ctx = VersionContext::new(1);
        ctx.begin_job();
        ctx.begin_job();
        assert!(!ctx.finish_job());
        assert!(ctx.finish_job());
        assert_eq!(ctx.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn test_wait_compiled_returns_when_drained() {
        let ctx = VersionContext::new(1);
        ctx.begin_job();
        let worker = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            worker.finish_job();
        });
        assert_eq!(ctx.wait_compiled().await, Ok(()));
    }

    #[tokio::test]
    async fn test_wait_compiled_wakes_on_cancel() {
        let ctx = VersionContext::new(1);
        ctx.begin_job();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        assert_eq!(ctx.wait_compiled().await, Err(Error::Stale));
    }
}
