use std::sync::Arc;

use parking_lot::Mutex;

use super::{FailoverResult, FailoverStrategy, ServerHandle};

/// Thread-safe handle around a failover strategy.
///
/// Selection and both reports run under one mutex shared by every clone of the
/// handle. The lock is only held for the duration of a single call.
pub struct SynchronizedFailoverStrategy<S: ServerHandle> {
    inner: Arc<Mutex<Box<dyn FailoverStrategy<S>>>>,
    name: &'static str,
    description: &'static str,
}

/// Wrap `strategy` so it can be shared between threads.
pub fn make_synchronized<S, F>(strategy: F) -> SynchronizedFailoverStrategy<S>
where
    S: ServerHandle,
    F: FailoverStrategy<S> + 'static,
{
    SynchronizedFailoverStrategy::new(Box::new(strategy))
}

impl<S: ServerHandle> SynchronizedFailoverStrategy<S> {
    pub fn new(strategy: Box<dyn FailoverStrategy<S>>) -> Self {
        let name = strategy.name();
        let description = strategy.description();
        Self {
            inner: Arc::new(Mutex::new(strategy)),
            name,
            description,
        }
    }

    pub fn select_service(&self) -> S {
        self.inner.lock().select_service()
    }

    pub fn report_failure(&self, server: &S) -> FailoverResult<()> {
        self.inner.lock().report_failure(server)
    }

    pub fn report_success(&self, server: &S) -> FailoverResult<()> {
        self.inner.lock().report_success(server)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

impl<S: ServerHandle> Clone for SynchronizedFailoverStrategy<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            name: self.name,
            description: self.description,
        }
    }
}

impl<S: ServerHandle> std::fmt::Debug for SynchronizedFailoverStrategy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizedFailoverStrategy")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<S: ServerHandle> FailoverStrategy<S> for SynchronizedFailoverStrategy<S> {
    fn select_service(&mut self) -> S {
        SynchronizedFailoverStrategy::select_service(self)
    }

    fn report_failure(&mut self, server: &S) -> FailoverResult<()> {
        SynchronizedFailoverStrategy::report_failure(self, server)
    }

    fn report_success(&mut self, server: &S) -> FailoverResult<()> {
        SynchronizedFailoverStrategy::report_success(self, server)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }
}
