//! Shared, timeout-bounded access to a blocking bus from async tasks.
//!
//! The bus components block the calling thread for the whole transaction.
//! `SharedBus` serialises callers behind a tokio mutex and runs each
//! operation on the blocking thread pool, so a hung transaction can be
//! reported as [`BusError::BusTimeout`] instead of stalling the caller.
//! The blocking call itself cannot be cancelled: it keeps the bus locked
//! until it returns, and later callers queue behind it.

use crate::errors::{BusError, BusResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

pub struct SharedBus<B> {
    name: String,
    inner: Arc<Mutex<B>>,
    timeout: Option<Duration>,
}

impl<B> Clone for SharedBus<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
            timeout: self.timeout,
        }
    }
}

impl<B: Send + 'static> SharedBus<B> {
    pub fn new(name: impl Into<String>, bus: B) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(bus)),
            timeout: None,
        }
    }

    /// Bound every [`run`](Self::run) call, including time spent waiting
    /// for the bus.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Exclusive access without the blocking pool, for quick non-I/O work
    /// such as inspecting state.
    pub async fn lock(&self) -> MutexGuard<'_, B> {
        self.inner.lock().await
    }

    /// Runs `op` against the bus on the blocking thread pool.
    pub async fn run<R, F>(&self, op: F) -> BusResult<R>
    where
        F: FnOnce(&mut B) -> BusResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let work = async move {
            let mut guard = inner.lock_owned().await;
            tokio::task::spawn_blocking(move || op(&mut *guard)).await
        };

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        "[SharedBus] {} operation exceeded {}ms",
                        self.name,
                        limit.as_millis()
                    );
                    return Err(BusError::BusTimeout {
                        bus: self.name.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => work.await,
        };

        joined.map_err(|e| BusError::TransactionFailed {
            device: self.name.clone(),
            reason: format!("bus task did not complete: {}", e),
        })?
    }
}
