use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::queue::{DurableQueue, QueueError};

#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<HashMap<String, VecDeque<String>>>>,
    failing_pushes: Arc<AtomicUsize>,
}

impl MemoryQueue {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self, key: &str) -> usize {
        self.lock().get(key).map(VecDeque::len).unwrap_or(0)
    }

    /// The next `n` pushes fail as if the database were unreachable.
    pub fn fail_next_pushes(&self, n: usize) {
        self.failing_pushes.store(n, Ordering::SeqCst);
    }

    pub fn drain(&self, key: &str) -> Vec<String> {
        self.lock()
            .get_mut(key)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

impl DurableQueue for MemoryQueue {
    async fn push(&self, key: &str, payload: String) -> Result<(), QueueError> {
        let failing = self
            .failing_pushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(QueueError::Database(sqlx::Error::PoolTimedOut));
        }
        self.lock().entry(key.to_string()).or_default().push_back(payload);
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.lock().get_mut(key).and_then(VecDeque::pop_front))
    }
}
