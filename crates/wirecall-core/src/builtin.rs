//! Introspection endpoints every server exposes.

use crate::registry::{EndpointDescriptor, Operations, Registry, Service, TraitMap};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

pub const LIST_ENDPOINT: &str = "Builtin.List";
pub const UPTIME_ENDPOINT: &str = "Builtin.Uptime";

/// Server start time and how long it has been running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uptime {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Receiver backing the built-in endpoints.
///
/// Holds the registry weakly: the registry owns this receiver through its
/// endpoints.
pub(crate) struct Builtin {
    registry: Weak<Registry>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Builtin {
    pub(crate) fn new(registry: &Arc<Registry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn list(&self) -> Result<(Vec<EndpointDescriptor>,), &'static str> {
        let registry = self.registry.upgrade().ok_or("registry has been dropped")?;
        Ok((registry.list(),))
    }

    /// Start time as unix seconds and elapsed whole seconds.
    fn uptime(&self) -> Result<(i64, u64), &'static str> {
        Ok((self.started_at.timestamp(), self.started.elapsed().as_secs()))
    }
}

impl Service for Builtin {
    fn trait_map(&self) -> TraitMap {
        crate::trait_map! {
            LIST_ENDPOINT => [],
            UPTIME_ENDPOINT => [],
        }
    }

    fn operations(ops: &mut Operations<Self>) {
        ops.add(LIST_ENDPOINT, Builtin::list)
            .add(UPTIME_ENDPOINT, Builtin::uptime);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    #[test]
    fn test_builtin_lists_itself() {
        let registry = Arc::new(Registry::new());
        registry.register(Builtin::new(&registry)).unwrap();

        let endpoint = registry.lookup(LIST_ENDPOINT).unwrap();
        let result = endpoint.invoke(Map::new()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1], Value::Null);

        let listed: Vec<EndpointDescriptor> = serde_json::from_value(result[0].clone()).unwrap();
        let names: Vec<&str> = listed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec![LIST_ENDPOINT, UPTIME_ENDPOINT]);
    }

    #[test]
    fn test_builtin_uptime() {
        let registry = Arc::new(Registry::new());
        registry.register(Builtin::new(&registry)).unwrap();

        let result = registry
            .lookup(UPTIME_ENDPOINT)
            .unwrap()
            .invoke(Map::new())
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result[0].as_i64().unwrap() > 0);
        assert!(result[1].as_u64().is_some());
    }

    #[test]
    fn test_builtin_list_after_registry_dropped() {
        let registry = Arc::new(Registry::new());
        let builtin = Builtin::new(&registry);
        drop(registry);
        assert!(builtin.list().is_err());
    }
}
