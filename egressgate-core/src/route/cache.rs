//! Bounded least-recently-used cache of IP to interface mappings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::NicResolver;
use crate::defaults;
use crate::error::Result;

/// Entries plus a recency index ordered by last use.
#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<String, (String, u64)>,
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl LruState {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, ip: &str) -> Option<String> {
        let tick = self.next_tick();
        let (nic, last_used) = self.entries.get_mut(ip)?;
        self.recency.remove(&*last_used);
        *last_used = tick;
        self.recency.insert(tick, ip.to_string());
        Some(nic.clone())
    }

    fn insert(&mut self, ip: &str, nic: String, capacity: usize) {
        let tick = self.next_tick();
        if let Some((_, previous)) = self.entries.insert(ip.to_string(), (nic, tick)) {
            self.recency.remove(&previous);
        }
        self.recency.insert(tick, ip.to_string());

        while self.entries.len() > capacity {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }
}

/// Caches a [`NicResolver`], consulting it only on misses.
///
/// The lock is never held across the delegate call, so concurrent misses on
/// the same address may both resolve; the last insert wins. Failures are not
/// cached.
pub struct CachedNicResolver {
    delegate: Arc<dyn NicResolver>,
    capacity: usize,
    state: Mutex<LruState>,
}

impl CachedNicResolver {
    /// Wraps `delegate` with the default capacity.
    pub fn new(delegate: Arc<dyn NicResolver>) -> Self {
        Self::with_capacity(delegate, defaults::ROUTE_CACHE_CAPACITY)
    }

    /// Wraps `delegate`, keeping at most `capacity` entries (minimum 1).
    pub fn with_capacity(delegate: Arc<dyn NicResolver>, capacity: usize) -> Self {
        Self {
            delegate,
            capacity: capacity.max(1),
            state: Mutex::new(LruState::default()),
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn cached(&self, ip: &str) -> Option<String> {
        self.state.lock().get(ip)
    }
}

#[async_trait]
impl NicResolver for CachedNicResolver {
    async fn resolve(&self, ip: &str) -> Result<String> {
        if let Some(nic) = self.cached(ip) {
            debug!(ip = %ip, nic = %nic, "Route cache hit");
            return Ok(nic);
        }

        let nic = self.delegate.resolve(ip).await?;
        self.state.lock().insert(ip, nic.clone(), self.capacity);
        Ok(nic)
    }
}
