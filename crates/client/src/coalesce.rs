//! Request coalescing.
//!
//! When several callers ask for the same key at once only the first (the
//! leader) runs the request; the rest subscribe to its result.
//!
//! ```text
//! caller A ─┐
//! caller B ─┼──► Coalescer ──► one request ──┐
//! caller C ─┘        ▲                       │
//!                    └──── shared result ◄───┘
//! ```
//!
//! If the leader is dropped before finishing, the key is released and one of
//! its waiters takes over as the new leader with its own request.

use crate::error::FetchResult;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Counters for monitoring how often requests were shared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoalescerStats {
    pub total_requests: u64,
    pub coalesced_requests: u64,
}

/// Tracks in-flight requests by key.
pub struct Coalescer<K, T> {
    in_flight: Mutex<HashMap<K, broadcast::Sender<FetchResult<T>>>>,
    total: AtomicU64,
    coalesced: AtomicU64,
}

enum Role<T> {
    Leader(broadcast::Sender<FetchResult<T>>),
    Follower(broadcast::Receiver<FetchResult<T>>),
}

impl<K, T> Default for Coalescer<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Coalescer<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            total: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, broadcast::Sender<FetchResult<T>>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, key: &K) -> Role<T> {
        let mut in_flight = self.lock();
        if let Some(tx) = in_flight.get(key) {
            debug!(key = %key, "Coalescing request with in-flight fetch");
            Role::Follower(tx.subscribe())
        } else {
            let (tx, _rx) = broadcast::channel(1);
            in_flight.insert(key.clone(), tx.clone());
            Role::Leader(tx)
        }
    }

    /// Run `request` for `key`, or wait for the in-flight run of the same key.
    pub async fn run<F, Fut>(&self, key: K, request: F) -> FetchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut role = self.register(&key);
        if matches!(role, Role::Follower(_)) {
            self.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        loop {
            match role {
                Role::Follower(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    Err(_) => {
                        debug!(key = %key, "In-flight request abandoned, retrying");
                        role = self.register(&key);
                    }
                },
                Role::Leader(tx) => {
                    let mut flight = Flight {
                        coalescer: self,
                        key: Some(key),
                    };
                    let result = request().await;
                    // Deregister before broadcasting so late callers start a new request
                    flight.finish();
                    let _ = tx.send(result.clone());
                    return result;
                }
            }
        }
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Leader's registration; releases the key when finished or dropped.
struct Flight<'a, K, T>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    T: Clone,
{
    coalescer: &'a Coalescer<K, T>,
    key: Option<K>,
}

impl<K, T> Flight<'_, K, T>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    T: Clone,
{
    fn finish(&mut self) {
        if let Some(key) = self.key.take() {
            self.coalescer.lock().remove(&key);
        }
    }
}

impl<K, T> Drop for Flight<'_, K, T>
where
    K: Eq + Hash + Clone + std::fmt::Display,
    T: Clone,
{
    fn drop(&mut self) {
        if let Some(key) = &self.key {
            debug!(key = %key, "Leader dropped before completing, releasing waiters");
        }
        // The leader's sender drops with its future, closing the channel
        self.finish();
    }
}
