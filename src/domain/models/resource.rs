//! Resource pool slot classes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Backend class used for admission-slot bookkeeping. Coarser than `Tier`:
/// every cloud `Tier` shares the single `Cloud` slot class, since
/// concurrency is governed per-cloud-provider at this layer and per-model
/// at the `RateGovernor` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTier {
    Local,
    Cloud,
    RemoteLocal,
}

impl ResourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
            Self::RemoteLocal => "remote_local",
        }
    }

    pub fn default_max_slots(&self) -> u32 {
        match self {
            Self::Local => 1,
            Self::Cloud => 2,
            Self::RemoteLocal => 1,
        }
    }

    /// `getResourceForComplexity`: local iff complexity < 10.
    pub fn for_complexity(complexity: u8) -> Self {
        if complexity < 10 {
            Self::Local
        } else {
            Self::Cloud
        }
    }

    pub fn for_use_cloud(use_cloud: bool) -> Self {
        if use_cloud {
            Self::Cloud
        } else {
            Self::Local
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceSlot {
    pub tier: ResourceTier,
    pub max_slots: u32,
    pub active_tasks: HashSet<Uuid>,
}

impl ResourceSlot {
    pub fn new(tier: ResourceTier, max_slots: u32) -> Self {
        Self {
            tier,
            max_slots,
            active_tasks: HashSet::new(),
        }
    }

    pub fn has_capacity(&self) -> bool {
        (self.active_tasks.len() as u32) < self.max_slots
    }
}
