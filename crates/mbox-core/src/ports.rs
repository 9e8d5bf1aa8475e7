//! Host port pool for game-server instances
//!
//! The pool is the authoritative record of which host ports this process has
//! handed out. It is rebuilt from the runtime once, when the instance manager
//! is constructed; changes made behind mbox's back are not picked up until
//! the next restart.

use crate::{CoreError, Result};
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Mutex, MutexGuard};

/// Checks whether the operating system would let us bind a port right now
pub trait PortProbe: Send + Sync {
    fn is_bindable(&self, port: u16) -> bool;
}

/// Probes by briefly binding a TCP listener on all interfaces
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpProbe;

impl PortProbe for TcpProbe {
    fn is_bindable(&self, port: u16) -> bool {
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
    }
}

/// State of a claimed port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortClaim {
    /// Handed out by `allocate`, instance not created yet
    Reserved,
    /// Bound to the named instance
    Owned(String),
}

/// Lock-guarded pool of ports in `[start, end]`
pub struct PortAllocator {
    start: u16,
    end: u16,
    probe: Box<dyn PortProbe>,
    claims: Mutex<BTreeMap<u16, PortClaim>>,
}

impl PortAllocator {
    /// Pool over `[start, end]` that probes the OS before handing out a port
    pub fn new(start: u16, end: u16) -> Self {
        Self::with_probe(start, end, Box::new(TcpProbe))
    }

    pub fn with_probe(start: u16, end: u16, probe: Box<dyn PortProbe>) -> Self {
        Self {
            start,
            end,
            probe,
            claims: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn range(&self) -> (u16, u16) {
        (self.start, self.end)
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    fn claims(&self) -> MutexGuard<'_, BTreeMap<u16, PortClaim>> {
        // The map stays consistent across a panicking holder: every mutation is a single insert/remove
        self.claims.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the pool's contents with the runtime's live bindings
    ///
    /// Bindings outside the configured range are ignored.
    pub fn reconcile<I>(&self, bindings: I)
    where
        I: IntoIterator<Item = (u16, String)>,
    {
        let mut claims = self.claims();
        claims.clear();
        for (port, owner) in bindings {
            if !self.contains(port) {
                tracing::debug!("Ignoring {} bound to {} outside pool range", owner, port);
                continue;
            }
            if let Some(PortClaim::Owned(previous)) = claims.get(&port) {
                tracing::warn!(
                    "Port {} claimed by both {} and {}, keeping {}",
                    port,
                    previous,
                    owner,
                    owner
                );
            }
            claims.insert(port, PortClaim::Owned(owner));
        }
        tracing::info!(
            "Port pool {}-{} reconciled: {} in use",
            self.start,
            self.end,
            claims.len()
        );
    }

    /// Claim the lowest free port
    ///
    /// The scan and the claim happen under one lock, so concurrent callers
    /// never receive the same port.
    pub fn allocate(&self) -> Result<u16> {
        let mut claims = self.claims();
        for port in self.start..=self.end {
            if claims.contains_key(&port) {
                continue;
            }
            if !self.probe.is_bindable(port) {
                tracing::debug!("Port {} is free in the pool but bound by another process", port);
                continue;
            }
            claims.insert(port, PortClaim::Reserved);
            tracing::debug!("Allocated port {}", port);
            return Ok(port);
        }
        Err(CoreError::PortExhausted {
            start: self.start,
            end: self.end,
        })
    }

    /// Record that `port` now belongs to `owner`
    pub fn assign(&self, port: u16, owner: &str) {
        self.claims()
            .insert(port, PortClaim::Owned(owner.to_string()));
    }

    /// Return `port` to the pool; releasing a free port is a no-op
    pub fn release(&self, port: u16) -> bool {
        let released = self.claims().remove(&port).is_some();
        if released {
            tracing::debug!("Released port {}", port);
        }
        released
    }

    /// Release every port owned by `owner`, returning them
    pub fn release_owner(&self, owner: &str) -> Vec<u16> {
        let mut claims = self.claims();
        let ports: Vec<u16> = claims
            .iter()
            .filter(|(_, claim)| matches!(claim, PortClaim::Owned(o) if o == owner))
            .map(|(port, _)| *port)
            .collect();
        for port in &ports {
            claims.remove(port);
        }
        ports
    }

    pub fn claim(&self, port: u16) -> Option<PortClaim> {
        self.claims().get(&port).cloned()
    }

    pub fn port_of(&self, owner: &str) -> Option<u16> {
        self.claims()
            .iter()
            .find(|(_, claim)| matches!(claim, PortClaim::Owned(o) if o == owner))
            .map(|(port, _)| *port)
    }

    /// Currently claimed ports, ascending
    pub fn allocated(&self) -> Vec<u16> {
        self.claims().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.claims().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims().is_empty()
    }
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("claims", &*self.claims())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    struct AlwaysFree;

    impl PortProbe for AlwaysFree {
        fn is_bindable(&self, _port: u16) -> bool {
            true
        }
    }

    struct BusyPorts(Vec<u16>);

    impl PortProbe for BusyPorts {
        fn is_bindable(&self, port: u16) -> bool {
            !self.0.contains(&port)
        }
    }

    fn pool(start: u16, end: u16) -> PortAllocator {
        PortAllocator::with_probe(start, end, Box::new(AlwaysFree))
    }

    #[test]
    fn test_allocate_ascending() {
        let pool = pool(25565, 25567);
        assert_eq!(pool.allocate().unwrap(), 25565);
        assert_eq!(pool.allocate().unwrap(), 25566);
        assert_eq!(pool.allocate().unwrap(), 25567);
        assert_eq!(pool.claim(25565), Some(PortClaim::Reserved));
    }

    #[test]
    fn test_allocate_reuses_lowest_released() {
        let pool = pool(25565, 25567);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert!(pool.release(25566));
        assert_eq!(pool.allocate().unwrap(), 25566);
    }

    #[test]
    fn test_exhausted_pool_unchanged() {
        let pool = pool(25565, 25566);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        let before = pool.allocated();

        let err = pool.allocate().unwrap_err();
        assert!(matches!(
            err,
            CoreError::PortExhausted {
                start: 25565,
                end: 25566
            }
        ));
        assert_eq!(pool.allocated(), before);
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = pool(25565, 25566);
        let port = pool.allocate().unwrap();
        assert!(pool.release(port));
        assert!(!pool.release(port));
        assert!(!pool.release(40000));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_skips_ports_bound_by_other_processes() {
        let pool = PortAllocator::with_probe(25565, 25567, Box::new(BusyPorts(vec![25565, 25566])));
        assert_eq!(pool.allocate().unwrap(), 25567);
        assert!(pool.allocate().is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_reconcile_replaces_contents() {
        let pool = pool(25565, 25570);
        pool.allocate().unwrap();
        pool.reconcile(vec![
            (25566, "mboxmini-a".to_string()),
            (25568, "mboxmini-b".to_string()),
            (30000, "elsewhere".to_string()),
        ]);

        assert_eq!(pool.allocated(), vec![25566, 25568]);
        assert_eq!(pool.port_of("mboxmini-b"), Some(25568));
        assert_eq!(pool.claim(25565), None);
    }

    #[test]
    fn test_allocate_after_reconcile_avoids_reconciled_ports() {
        let pool = pool(25565, 25568);
        let live: Vec<(u16, String)> = vec![
            (25565, "mboxmini-a".to_string()),
            (25566, "mboxmini-b".to_string()),
            (25568, "mboxmini-c".to_string()),
        ];
        pool.reconcile(live.clone());
        let port = pool.allocate().unwrap();
        assert!(live.iter().all(|(p, _)| *p != port));
        assert_eq!(port, 25567);
    }

    #[test]
    fn test_assign_and_release_owner() {
        let pool = pool(25565, 25570);
        let port = pool.allocate().unwrap();
        pool.assign(port, "mboxmini-alpha");
        assert_eq!(pool.claim(port), Some(PortClaim::Owned("mboxmini-alpha".into())));
        assert_eq!(pool.port_of("mboxmini-alpha"), Some(port));

        assert_eq!(pool.release_owner("mboxmini-alpha"), vec![port]);
        assert!(pool.release_owner("mboxmini-alpha").is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_concurrent_allocations_are_unique() {
        let pool = Arc::new(pool(20000, 20063));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    for _ in 0..8 {
                        mine.push(pool.allocate().unwrap());
                    }
                    // Give half back to interleave releases with other threads' scans
                    for port in mine.drain(..4) {
                        assert!(pool.release(port));
                    }
                    mine
                })
            })
            .collect();

        let mut held = Vec::new();
        for handle in handles {
            held.extend(handle.join().unwrap());
        }

        let unique: HashSet<u16> = held.iter().copied().collect();
        assert_eq!(unique.len(), held.len(), "a port was handed out twice");
        assert_eq!(pool.len(), held.len());
        assert!(held.iter().all(|p| pool.contains(*p)));
    }
}
