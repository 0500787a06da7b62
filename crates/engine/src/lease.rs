//! Per-user lease serializing checkout-critical sections.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::UserId;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

type LeaseMap = Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>;

/// A keyed set of async mutexes, one per user.
///
/// Prepare, expiry and the finalize/pay/cancel transitions take the
/// user's lease so check-then-act sequences within this process cannot
/// interleave. Cross-process races are closed separately by the
/// checkout store's atomic `insert_active`.
///
/// An entry is evicted when the last guard for that user drops, so the
/// map stays bounded by the number of users currently in a critical
/// section rather than every user ever seen.
#[derive(Clone, Default)]
pub struct UserLeases {
    locks: LeaseMap,
}

impl UserLeases {
    /// Creates a new empty lease set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lease for a user, waiting if another task holds it.
    pub async fn acquire(&self, user_id: UserId) -> UserLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap();
            locks
                .entry(user_id.as_uuid())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        UserLease {
            locks: self.locks.clone(),
            user_id: user_id.as_uuid(),
            guard: Some(guard),
        }
    }

    /// Number of users currently holding or awaiting a lease.
    pub fn lease_count(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

/// A held user lease. Dropping it releases the lease and evicts the
/// map entry when no other task holds or awaits it.
pub struct UserLease {
    locks: LeaseMap,
    user_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLease {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap();
        self.guard.take();
        // The map lock is held across the release, so the count check
        // cannot race with another task's drop. A parked waiter keeps
        // its own Arc clone, which keeps the count above 1.
        let unused = locks
            .get(&self.user_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if unused {
            locks.remove(&self.user_id);
        }
    }
}
