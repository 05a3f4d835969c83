//! Download slot counters.
//!
//! Acquisition is try-only: callers that find no free slot back off and poll
//! again rather than block. Each counter sits behind one mutex that is held
//! just long enough to check and bump it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fixed number of global download slots.
#[derive(Debug)]
pub struct SlotPool {
    limit:  usize,
    in_use: Mutex<usize>,
}

impl SlotPool {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit:  limit.max(1),
            in_use: Mutex::new(0),
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        let mut in_use = lock(&self.in_use);
        if *in_use >= self.limit {
            return None;
        }
        *in_use += 1;
        Some(SlotGuard {
            pool: Arc::clone(self),
        })
    }

    pub fn available(&self) -> usize { self.limit - *lock(&self.in_use) }

    pub fn limit(&self) -> usize { self.limit }
}

/// Releases its slot on drop.
#[derive(Debug)]
pub struct SlotGuard {
    pool: Arc<SlotPool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut in_use = lock(&self.pool.in_use);
        *in_use = in_use.saturating_sub(1);
    }
}

/// Per-host slot counters. Hosts with no active downloads hold no entry.
#[derive(Debug)]
pub struct HostSlots {
    limit:  usize,
    in_use: Mutex<HashMap<String, usize>>,
}

impl HostSlots {
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            limit:  limit.max(1),
            in_use: Mutex::new(HashMap::new()),
        })
    }

    pub fn try_acquire(self: &Arc<Self>, host: &str) -> Option<HostSlotGuard> {
        let mut in_use = lock(&self.in_use);
        let count = in_use.entry(host.to_string()).or_insert(0);
        if *count >= self.limit {
            return None;
        }
        *count += 1;
        Some(HostSlotGuard {
            slots: Arc::clone(self),
            host:  host.to_string(),
        })
    }

    pub fn active(&self, host: &str) -> usize {
        lock(&self.in_use).get(host).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct HostSlotGuard {
    slots: Arc<HostSlots>,
    host:  String,
}

impl HostSlotGuard {
    pub fn host(&self) -> &str { &self.host }
}

impl Drop for HostSlotGuard {
    fn drop(&mut self) {
        let mut in_use = lock(&self.slots.in_use);
        if let Some(count) = in_use.get_mut(&self.host) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_use.remove(&self.host);
            }
        }
    }
}
