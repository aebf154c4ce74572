use std::sync::{Arc, PoisonError, RwLock};

use crate::network::hub::HubPort;
use crate::network::CoreId;

/// Lookup from a core id to the shared part of that core's model.
pub trait HubDirectory: Send + Sync {
    fn register(&self, port: Arc<HubPort>);

    fn hub_port(&self, core_id: CoreId) -> Option<Arc<HubPort>>;
}

/// Directory of every core built in this process, indexed by core id.
#[derive(Default)]
pub struct ClusterRegistry {
    ports: RwLock<Vec<Option<Arc<HubPort>>>>,
}

impl ClusterRegistry {
    pub fn new(total_cores: usize) -> Self {
        Self {
            ports: RwLock::new(vec![None; total_cores]),
        }
    }

    pub fn len(&self) -> usize {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|port| port.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HubDirectory for ClusterRegistry {
    fn register(&self, port: Arc<HubPort>) {
        let mut ports = self.ports.write().unwrap_or_else(PoisonError::into_inner);
        let core_id = port.core_id();
        if core_id >= ports.len() {
            ports.resize(core_id + 1, None);
        }
        ports[core_id] = Some(port);
    }

    fn hub_port(&self, core_id: CoreId) -> Option<Arc<HubPort>> {
        self.ports
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(core_id)
            .and_then(Option::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_replaces_ports() {
        let registry = ClusterRegistry::new(4);
        assert!(registry.is_empty());
        registry.register(Arc::new(HubPort::new(2, false, 4, None)));
        // ids past the initial size grow the table
        registry.register(Arc::new(HubPort::new(6, false, 4, None)));
        assert_eq!(2, registry.len());
        assert_eq!(Some(2), registry.hub_port(2).map(|p| p.core_id()));
        assert!(registry.hub_port(0).is_none());
        assert!(registry.hub_port(99).is_none());
    }
}
