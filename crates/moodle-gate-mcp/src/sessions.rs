// crates/moodle-gate-mcp/src/sessions.rs
// ============================================================================
// Module: Session Manager
// Description: Owned session store with TTL eviction and a periodic sweep.
// Purpose: Bind session identifiers to tenants and reclaim idle sessions.
// Dependencies: moodle-gate-core, tokio, tokio-util
// ============================================================================

//! ## Overview
//! Sessions are in-memory only: an identifier maps to the resolved tenant,
//! the bound transport handle, and a last-activity timestamp. Lookup
//! refreshes the lease; eviction removes the entry unconditionally; a
//! background sweep additionally closes the transports of entries idle
//! longer than the TTL, ignoring close errors. The manager owns its sweep
//! task: `start` spawns it and `stop` tears it down, so the process can
//! shut down without leaking a timer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use moodle_gate_core::GatewayError;
use moodle_gate_core::Tenant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// SECTION: Transport Seam
// ============================================================================

/// Handle to the protocol transport bound to one session.
///
/// The sweep closes transports of evicted sessions; close failures are
/// ignored because the session is gone either way.
pub trait SessionTransport: Send + Sync {
    /// Closes the transport.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the close fails; callers during
    /// eviction ignore the error.
    fn close(&self) -> Result<(), GatewayError>;
}

/// Transport handle with nothing to tear down.
pub struct NoopTransport;

impl SessionTransport for NoopTransport {
    fn close(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// One bound execution context.
struct SessionEntry {
    /// Tenant resolved at session creation.
    tenant: Arc<Tenant>,
    /// Bound transport handle.
    transport: Arc<dyn SessionTransport>,
    /// Timestamp of the most recent access.
    last_activity: Instant,
}

/// Session store with TTL eviction.
///
/// # Invariants
/// - `get` refreshes the lease; a session accessed within the TTL window is
///   never evicted by that sweep cycle.
/// - `evict` is idempotent.
pub struct SessionManager {
    /// Live sessions keyed by identifier.
    entries: Mutex<BTreeMap<String, SessionEntry>>,
    /// Idle TTL before eviction.
    ttl: Duration,
    /// Interval between sweep cycles.
    sweep_interval: Duration,
    /// Handle of the running sweep task.
    sweeper: Mutex<Option<JoinHandle<()>>>,
    /// Cancellation for the sweep task.
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Creates a session manager with the given TTL and sweep interval.
    #[must_use]
    pub fn new(ttl_ms: u64, sweep_interval_ms: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            ttl: Duration::from_millis(ttl_ms),
            sweep_interval: Duration::from_millis(sweep_interval_ms),
            sweeper: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the background sweep task. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut guard = lock_ignoring_poison(&self.sweeper);
        if guard.is_some() {
            return;
        }
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();
        let interval = self.sweep_interval;
        *guard = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = tokio::time::sleep(interval) => manager.sweep(Instant::now()),
                }
            }
        }));
    }

    /// Stops the sweep task and evicts every live session.
    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = lock_ignoring_poison(&self.sweeper).take() {
            handle.abort();
        }
        let entries = std::mem::take(&mut *lock_ignoring_poison(&self.entries));
        for entry in entries.into_values() {
            let _ = entry.transport.close();
        }
    }

    /// Binds a tenant and transport under a session identifier.
    pub fn insert(
        &self,
        session_id: impl Into<String>,
        tenant: Arc<Tenant>,
        transport: Arc<dyn SessionTransport>,
    ) {
        lock_ignoring_poison(&self.entries).insert(session_id.into(), SessionEntry {
            tenant,
            transport,
            last_activity: Instant::now(),
        });
    }

    /// Looks up a session, refreshing its lease on hit.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Tenant>> {
        let mut entries = lock_ignoring_poison(&self.entries);
        entries.get_mut(session_id).map(|entry| {
            entry.last_activity = Instant::now();
            Arc::clone(&entry.tenant)
        })
    }

    /// Evicts one session unconditionally. Idempotent.
    ///
    /// Eviction only removes the entry; the transport reports its own
    /// closure and triggers this call, so closing here would be circular.
    /// The sweep is the path that closes abandoned transports.
    pub fn evict(&self, session_id: &str) {
        lock_ignoring_poison(&self.entries).remove(session_id);
    }

    /// Evicts every session idle longer than the TTL at `now`.
    pub fn sweep(&self, now: Instant) {
        let expired: Vec<SessionEntry> = {
            let mut entries = lock_ignoring_poison(&self.entries);
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.last_activity) > self.ttl)
                .map(|(id, _)| id.clone())
                .collect();
            stale.into_iter().filter_map(|id| entries.remove(&id)).collect()
        };
        // Close outside the lock; a slow transport must not stall lookups.
        for entry in expired {
            let _ = entry.transport.close();
        }
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_ignoring_poison(&self.entries).len()
    }

    /// Returns true when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Locks a mutex, recovering the inner data if a holder panicked.
fn lock_ignoring_poison<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use std::time::Instant;

    use moodle_gate_core::GatewayError;
    use moodle_gate_core::Role;
    use moodle_gate_core::Tenant;

    use super::SessionManager;
    use super::SessionTransport;

    /// Transport that counts close calls and can fail them.
    struct CountingTransport {
        /// Number of close invocations.
        closes: AtomicUsize,
        /// Whether close reports an error.
        fail: bool,
    }

    impl SessionTransport for CountingTransport {
        fn close(&self) -> Result<(), GatewayError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GatewayError::RemoteTransport("close failed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Builds a tenant with a single role.
    fn tenant() -> Arc<Tenant> {
        let roles: BTreeSet<Role> = [Role::Teacher].into_iter().collect();
        Arc::new(Tenant::new("https://moodle.test", "tok", roles).unwrap())
    }

    /// Builds a counting transport.
    fn transport(fail: bool) -> Arc<CountingTransport> {
        Arc::new(CountingTransport {
            closes: AtomicUsize::new(0),
            fail,
        })
    }

    #[test]
    fn get_returns_same_tenant_without_duplicating() {
        let manager = SessionManager::new(60_000, 60_000);
        manager.insert("s1", tenant(), transport(false) as Arc<dyn SessionTransport>);
        let first = manager.get("s1").unwrap();
        let second = manager.get("s1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn sweep_evicts_only_idle_sessions() {
        let manager = SessionManager::new(50, 1_000);
        let stale = transport(false);
        let fresh = transport(false);
        manager.insert("stale", tenant(), Arc::clone(&stale) as Arc<dyn SessionTransport>);
        manager.insert("fresh", tenant(), Arc::clone(&fresh) as Arc<dyn SessionTransport>);

        std::thread::sleep(Duration::from_millis(80));
        // Refresh the lease on one session inside the TTL window.
        let _ = manager.get("fresh");
        manager.sweep(Instant::now());

        assert!(manager.get("stale").is_none());
        assert!(manager.get("fresh").is_some());
        assert_eq!(stale.closes.load(Ordering::SeqCst), 1);
        assert_eq!(fresh.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sweep_ignores_close_failures() {
        let manager = SessionManager::new(10, 1_000);
        let failing = transport(true);
        manager.insert("s1", tenant(), Arc::clone(&failing) as Arc<dyn SessionTransport>);
        std::thread::sleep(Duration::from_millis(30));
        manager.sweep(Instant::now());
        assert!(manager.is_empty());
        assert_eq!(failing.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn evict_is_idempotent_and_does_not_close() {
        let manager = SessionManager::new(60_000, 60_000);
        let handle = transport(false);
        manager.insert("s1", tenant(), Arc::clone(&handle) as Arc<dyn SessionTransport>);
        manager.evict("s1");
        manager.evict("s1");
        assert!(manager.is_empty());
        assert_eq!(handle.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_tears_down_sweeper_and_sessions() {
        let manager = Arc::new(SessionManager::new(60_000, 10));
        manager.start();
        manager.insert("s1", tenant(), transport(false) as Arc<dyn SessionTransport>);
        manager.stop();
        assert!(manager.is_empty());
    }
}
