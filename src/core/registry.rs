use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::core::dialect::{Connector, DialectState, ServerInfo};
use crate::error::Result;

/// Host-assigned identity of a live driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// Known connections and their dialect state.
///
/// States are built on the first call seen for a connection and stay until
/// [`Registry::evict`] is called.
#[derive(Debug)]
pub struct Registry {
    states: DashMap<ConnectionId, Arc<DialectState>, ahash::RandomState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self { states: DashMap::with_hasher(ahash::RandomState::new()) }
    }

    pub fn get_or_create<C: Connector + ?Sized>(
        &self,
        id: ConnectionId,
        connector: &C,
    ) -> Result<Arc<DialectState>> {
        self.resolve(id, connector).map(|(state, _)| state)
    }

    /// Like [`Registry::get_or_create`], also reporting whether this call stored a new state.
    ///
    /// The connector runs without any map lock held, so it may call back into
    /// the registry. Two racing first calls may both build; the first insert wins.
    pub fn resolve<C: Connector + ?Sized>(
        &self,
        id: ConnectionId,
        connector: &C,
    ) -> Result<(Arc<DialectState>, bool)> {
        if let Some(state) = self.get(id) {
            return Ok((state, false));
        }

        let built = Arc::new(DialectState::from_connector(connector)?);
        match self.states.entry(id) {
            Entry::Occupied(e) => Ok((e.get().clone(), false)),
            Entry::Vacant(e) => {
                e.insert(built.clone());
                tracing::debug!(
                    target: "sqltrace::registry",
                    connection = id.0,
                    prefix = %built.prefix(),
                    "dialect state created"
                );
                Ok((built, true))
            }
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<DialectState>> {
        self.states.get(&id).map(|s| s.clone())
    }

    /// Stores server details for a known connection. Only the first call per
    /// connection has an effect; returns whether this one did.
    pub fn mark_connected(&self, id: ConnectionId, info: ServerInfo) -> bool {
        let Some(state) = self.get(id) else {
            tracing::debug!(target: "sqltrace::registry", connection = id.0, "mark_connected for unknown connection");
            return false;
        };
        let version = info.version;
        let stored = state.set_server_info(info);
        if stored {
            tracing::debug!(target: "sqltrace::registry", connection = id.0, version, "server info gathered");
        }
        stored
    }

    pub fn evict(&self, id: ConnectionId) -> bool {
        self.states.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dialect::TempTablePredicate;
    use crate::error::SqlTraceError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDriver {
        builds: AtomicUsize,
    }

    impl Connector for CountingDriver {
        fn prefix(&self) -> String {
            self.builds.fetch_add(1, Ordering::SeqCst);
            "p_".into()
        }
        fn reserved_words(&self) -> Option<Vec<String>> {
            Some(vec![])
        }
        fn temp_table_predicate(&self) -> Option<TempTablePredicate> {
            Some(Arc::new(|_: &str| false))
        }
    }

    struct Broken;
    impl Connector for Broken {
        fn prefix(&self) -> String {
            "p_".into()
        }
        fn reserved_words(&self) -> Option<Vec<String>> {
            Some(vec![])
        }
    }

    #[test]
    fn builds_once_per_connection() {
        let registry = Registry::new();
        let driver = CountingDriver::default();
        let a = registry.get_or_create(ConnectionId(1), &driver).unwrap();
        let b = registry.get_or_create(ConnectionId(1), &driver).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(driver.builds.load(Ordering::SeqCst), 1);

        registry.get_or_create(ConnectionId(2), &driver).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn failed_build_caches_nothing() {
        let registry = Registry::new();
        let err = registry.get_or_create(ConnectionId(1), &Broken).unwrap_err();
        assert_eq!(err, SqlTraceError::Configuration("temp_table_predicate"));
        assert!(registry.is_empty());
        assert!(registry.get(ConnectionId(1)).is_none());
    }

    #[test]
    fn mark_connected_first_write_wins() {
        let registry = Registry::new();
        let driver = CountingDriver::default();
        let state = registry.get_or_create(ConnectionId(9), &driver).unwrap();

        assert!(registry.mark_connected(ConnectionId(9), ServerInfo::new(14)));
        assert!(!registry.mark_connected(ConnectionId(9), ServerInfo::new(10)));
        assert_eq!(state.server_info().map(|i| i.version), Some(14));
    }

    #[test]
    fn mark_connected_unknown_connection() {
        let registry = Registry::new();
        assert!(!registry.mark_connected(ConnectionId(3), ServerInfo::new(14)));
    }

    #[test]
    fn evict_forgets_state() {
        let registry = Registry::new();
        let driver = CountingDriver::default();
        registry.get_or_create(ConnectionId(1), &driver).unwrap();
        assert!(registry.evict(ConnectionId(1)));
        assert!(!registry.evict(ConnectionId(1)));
        registry.get_or_create(ConnectionId(1), &driver).unwrap();
        assert_eq!(driver.builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_builds_share_one_state() {
        let registry = Arc::new(Registry::new());
        let driver = Arc::new(CountingDriver::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let driver = driver.clone();
                std::thread::spawn(move || registry.get_or_create(ConnectionId(5), &*driver).unwrap())
            })
            .collect();
        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(states.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(Arc::ptr_eq(&states[0], &registry.get(ConnectionId(5)).unwrap()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_reports_creation_once() {
        let registry = Registry::new();
        let driver = CountingDriver::default();
        let (first, created) = registry.resolve(ConnectionId(6), &driver).unwrap();
        assert!(created);
        let (second, created) = registry.resolve(ConnectionId(6), &driver).unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
    }

    /// Reads the registry from inside its own capability calls.
    struct ReentrantDriver {
        registry: Arc<Registry>,
        seen_during_build: AtomicUsize,
    }

    impl Connector for ReentrantDriver {
        fn prefix(&self) -> String {
            if self.registry.get(ConnectionId(1)).is_none() {
                self.seen_during_build.fetch_add(1, Ordering::SeqCst);
            }
            let _ = self.registry.len();
            "p_".into()
        }
        fn reserved_words(&self) -> Option<Vec<String>> {
            let _ = self.registry.get_or_create(ConnectionId(2), &CountingDriver::default());
            Some(vec![])
        }
        fn temp_table_predicate(&self) -> Option<TempTablePredicate> {
            Some(Arc::new(|_: &str| false))
        }
    }

    #[test]
    fn connector_may_call_back_into_registry() {
        let registry = Arc::new(Registry::new());
        let driver = ReentrantDriver { registry: registry.clone(), seen_during_build: AtomicUsize::new(0) };
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = registry.clone();
        std::thread::spawn(move || {
            let built = worker.get_or_create(ConnectionId(1), &driver).is_ok();
            let _ = tx.send((built, driver.seen_during_build.load(Ordering::SeqCst)));
        });

        let (built, seen) = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("get_or_create blocked while the connector used the registry");
        assert!(built);
        assert_eq!(seen, 1);
        assert_eq!(registry.len(), 2);
    }
}
