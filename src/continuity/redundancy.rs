//! Redundancy pools - primary/secondary instances with generation-tagged
//! connection handles
//!
//! Connection requests return a handle to the active instance; on
//! instance failure the pool fails over and existing handles to the
//! failed instance are invalidated (their generation no longer matches).

use std::collections::HashMap;
use tracing::{info, warn};

/// A handle to a pool's active instance at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub pool_name: String,
    pub instance: String,
    generation: u64,
}

/// One redundancy pool.
#[derive(Debug)]
pub struct RedundancyPool {
    pub name: String,
    pub primary: String,
    pub secondary: String,
    active_is_primary: bool,
    generation: u64,
    handles_issued: u64,
}

impl RedundancyPool {
    pub fn new(name: &str, primary: &str, secondary: &str) -> Self {
        Self {
            name: name.to_string(),
            primary: primary.to_string(),
            secondary: secondary.to_string(),
            active_is_primary: true,
            generation: 0,
            handles_issued: 0,
        }
    }

    pub fn active_instance(&self) -> &str {
        if self.active_is_primary {
            &self.primary
        } else {
            &self.secondary
        }
    }

    /// Issue a handle bound to the current active instance.
    pub fn connect(&mut self) -> ConnectionHandle {
        self.handles_issued += 1;
        ConnectionHandle {
            pool_name: self.name.clone(),
            instance: self.active_instance().to_string(),
            generation: self.generation,
        }
    }

    /// A handle is valid while its generation matches the pool's.
    pub fn is_valid(&self, handle: &ConnectionHandle) -> bool {
        handle.pool_name == self.name && handle.generation == self.generation
    }

    /// Fail over to the other instance; bumps the generation so existing
    /// handles invalidate.
    pub fn fail_over(&mut self) {
        self.active_is_primary = !self.active_is_primary;
        self.generation += 1;
        warn!(
            pool = %self.name,
            active = %self.active_instance(),
            generation = self.generation,
            "Pool failed over - existing handles invalidated"
        );
    }

    /// Restore the primary as active (e.g. after repair).
    pub fn recover(&mut self) {
        if !self.active_is_primary {
            self.active_is_primary = true;
            self.generation += 1;
            info!(pool = %self.name, "Pool recovered to primary");
        }
    }
}

/// Manager over all redundancy pools.
#[derive(Default)]
pub struct RedundancyManager {
    pools: HashMap<String, RedundancyPool>,
}

impl RedundancyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, primary: &str, secondary: &str) {
        self.pools
            .insert(name.to_string(), RedundancyPool::new(name, primary, secondary));
    }

    pub fn pool(&self, name: &str) -> Option<&RedundancyPool> {
        self.pools.get(name)
    }

    pub fn connect(&mut self, name: &str) -> Option<ConnectionHandle> {
        self.pools.get_mut(name).map(RedundancyPool::connect)
    }

    pub fn is_valid(&self, handle: &ConnectionHandle) -> bool {
        self.pools
            .get(&handle.pool_name)
            .is_some_and(|p| p.is_valid(handle))
    }

    /// Report an instance failure; fails the pool over when the failed
    /// instance is the active one.
    pub fn report_failure(&mut self, name: &str, failed_instance: &str) -> bool {
        let Some(pool) = self.pools.get_mut(name) else {
            return false;
        };
        if pool.active_instance() == failed_instance {
            pool.fail_over();
            true
        } else {
            false
        }
    }

    pub fn recover(&mut self, name: &str) -> bool {
        let Some(pool) = self.pools.get_mut(name) else {
            return false;
        };
        pool.recover();
        true
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_track_active_instance() {
        let mut mgr = RedundancyManager::new();
        mgr.register("cache", "redis-a", "redis-b");

        let h1 = mgr.connect("cache").unwrap();
        assert_eq!(h1.instance, "redis-a");
        assert!(mgr.is_valid(&h1));

        assert!(mgr.report_failure("cache", "redis-a"));
        assert!(!mgr.is_valid(&h1));

        let h2 = mgr.connect("cache").unwrap();
        assert_eq!(h2.instance, "redis-b");
        assert!(mgr.is_valid(&h2));
    }

    #[test]
    fn failure_of_inactive_instance_is_ignored() {
        let mut mgr = RedundancyManager::new();
        mgr.register("cache", "redis-a", "redis-b");
        assert!(!mgr.report_failure("cache", "redis-b"));
        assert_eq!(mgr.pool("cache").unwrap().active_instance(), "redis-a");
    }

    #[test]
    fn failover_then_recovery_restores_primary() {
        let mut mgr = RedundancyManager::new();
        mgr.register("cache", "redis-a", "redis-b");
        mgr.report_failure("cache", "redis-a");
        assert_eq!(mgr.pool("cache").unwrap().active_instance(), "redis-b");
        mgr.recover("cache");
        assert_eq!(mgr.pool("cache").unwrap().active_instance(), "redis-a");
    }
}
