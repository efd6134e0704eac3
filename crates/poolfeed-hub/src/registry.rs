use dashmap::DashMap;
use poolfeed_core::config::{HubConfig, TailConfig};
use poolfeed_tail::FileTail;
use std::sync::Arc;
use tracing::info;

use crate::hub::BroadcastHub;

/// One hub per log-source set, created on first use.
///
/// Keyed by [`TailConfig::source_key`], so two configs naming the same files
/// share a hub (and a single tail source).
pub struct HubRegistry {
    hubs: DashMap<String, BroadcastHub>,
    hub_config: HubConfig,
}

impl HubRegistry {
    pub fn new(hub_config: HubConfig) -> Self {
        Self {
            hubs: DashMap::new(),
            hub_config,
        }
    }

    /// The hub for `tail`, creating it (stopped) if needed.
    pub fn hub_for(&self, tail: &TailConfig) -> BroadcastHub {
        let key = tail.source_key();
        self.hubs
            .entry(key)
            .or_insert_with(|| {
                info!(files = tail.resolved_files().len(), "creating broadcast hub");
                BroadcastHub::new(Arc::new(FileTail::new(tail.clone())), &self.hub_config)
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}
