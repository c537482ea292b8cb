//! Radio Coordinator
//!
//! The adapter is single-radio hardware: scanning, reconfiguring the beacon and
//! holding a droid link must not overlap. Each of those operations takes a
//! [`RadioLease`] for its duration; the lease is released on drop.

use crate::domain::models::RadioUse;
use crate::error::{DroidError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Permit and holder change together under `holder`'s lock
struct Shared {
    permits: Arc<Semaphore>,
    holder: Mutex<Option<RadioUse>>,
    released: Notify,
}

impl Shared {
    fn lock_holder(&self) -> MutexGuard<'_, Option<RadioUse>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct RadioCoordinator {
    shared: Arc<Shared>,
}

impl Default for RadioCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioCoordinator {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                permits: Arc::new(Semaphore::new(1)),
                holder: Mutex::new(None),
                released: Notify::new(),
            }),
        }
    }

    /// Take the radio or fail with `RadioBusy` naming the current holder
    pub fn try_acquire(&self, usage: RadioUse) -> Result<RadioLease> {
        self.grant(usage).map_err(|holder| {
            debug!("Radio request for {} refused, held by {}", usage, holder);
            DroidError::RadioBusy { holder }
        })
    }

    /// Wait for the radio to become free
    pub async fn acquire(&self, usage: RadioUse) -> RadioLease {
        loop {
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();
            if let Ok(lease) = self.grant(usage) {
                return lease;
            }
            released.await;
        }
    }

    pub fn holder(&self) -> Option<RadioUse> {
        *self.shared.lock_holder()
    }

    /// Hand out the lease, or report who holds the radio
    fn grant(&self, usage: RadioUse) -> std::result::Result<RadioLease, RadioUse> {
        let mut holder = self.shared.lock_holder();
        match self.shared.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                *holder = Some(usage);
                trace!("Radio granted to {}", usage);
                Ok(RadioLease {
                    usage,
                    shared: self.shared.clone(),
                    permit: Some(permit),
                })
            }
            Err(_) => Err(holder.unwrap_or(usage)),
        }
    }
}

/// Exclusive use of the radio until dropped
pub struct RadioLease {
    usage: RadioUse,
    shared: Arc<Shared>,
    permit: Option<OwnedSemaphorePermit>,
}

impl std::fmt::Debug for RadioLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioLease").field("usage", &self.usage).finish()
    }
}

impl Drop for RadioLease {
    fn drop(&mut self) {
        {
            let mut holder = self.shared.lock_holder();
            *holder = None;
            drop(self.permit.take());
        }
        self.shared.released.notify_waiters();
        trace!("Radio released by {}", self.usage);
    }
}
