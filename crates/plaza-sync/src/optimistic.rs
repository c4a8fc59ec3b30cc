use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use plaza_api::ApiError;

/// Why a local change did not go through.
#[derive(Debug, Error)]
pub enum MutationError {
    /// The same entity has a change in flight; the new request was dropped.
    #[error("another change to this item is still in flight")]
    Busy,

    #[error("item is not loaded")]
    Missing,

    #[error("{0}")]
    Invalid(&'static str),

    /// The server refused or could not be reached; local state was rolled back.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Apply-locally-then-confirm runner with one in-flight change per entity.
///
/// A second change for an entity whose first change has not settled is refused
/// with [`MutationError::Busy`] instead of being queued, so the rollback of one
/// can never clobber the apply of the next.
#[derive(Debug)]
pub struct Optimistic<K> {
    in_flight: Mutex<HashSet<K>>,
}

impl<K> Default for Optimistic<K> {
    fn default() -> Self {
        Self { in_flight: Mutex::new(HashSet::new()) }
    }
}

impl<K: Copy + Eq + Hash + std::fmt::Debug> Optimistic<K> {
    pub fn is_pending(&self, key: K) -> bool {
        self.in_flight.lock().contains(&key)
    }

    /// `apply` runs first and returns the undo token; `remote` is then awaited.
    /// On success `commit` sees the server's answer, on failure `rollback` gets
    /// the undo token back.
    pub async fn run<U, T, Fut>(
        &self,
        key: K,
        apply: impl FnOnce() -> Result<U, MutationError>,
        remote: Fut,
        commit: impl FnOnce(&T),
        rollback: impl FnOnce(U),
    ) -> Result<T, MutationError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let _slot = self.claim(key).ok_or(MutationError::Busy)?;
        let undo = apply()?;

        match remote.await {
            Ok(value) => {
                commit(&value);
                Ok(value)
            }
            Err(e) => {
                debug!("Rolling back change to {:?}: {}", key, e);
                rollback(undo);
                Err(e.into())
            }
        }
    }

    fn claim(&self, key: K) -> Option<Slot<'_, K>> {
        if !self.in_flight.lock().insert(key) {
            debug!("Change to {:?} already in flight", key);
            return None;
        }
        Some(Slot { owner: self, key })
    }
}

/// Releases the entity when the change settles, including on cancellation.
struct Slot<'a, K: Eq + Hash> {
    owner: &'a Optimistic<K>,
    key: K,
}

impl<K: Eq + Hash> Drop for Slot<'_, K> {
    fn drop(&mut self) {
        self.owner.in_flight.lock().remove(&self.key);
    }
}

/// Holds a view-wide busy flag (e.g. "sending") until dropped.
pub(crate) struct BusyClaim<'a>(&'a AtomicBool);

impl<'a> BusyClaim<'a> {
    pub(crate) fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for BusyClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
