//! Resource Pool: admission slots per backend class.
//!
//! All mutations happen under a single lock so admission and slot
//! membership stay linearizable across concurrent worker tasks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::{ResourceSlot, ResourceTier};
use crate::services::event_bus::EventBus;

struct PoolState {
    slots: HashMap<ResourceTier, ResourceSlot>,
}

impl PoolState {
    fn new() -> Self {
        let mut slots = HashMap::new();
        for tier in [ResourceTier::Local, ResourceTier::Cloud, ResourceTier::RemoteLocal] {
            slots.insert(tier, ResourceSlot::new(tier, tier.default_max_slots()));
        }
        Self { slots }
    }
}

#[derive(Clone)]
pub struct ResourcePool {
    state: Arc<Mutex<PoolState>>,
    events: EventBus,
}

impl ResourcePool {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState::new())),
            events,
        }
    }

    /// Override default slot counts (e.g. from `AppConfig`).
    pub async fn set_max_slots(&self, tier: ResourceTier, max_slots: u32) {
        let mut state = self.state.lock().await;
        state.slots.entry(tier).or_insert_with(|| ResourceSlot::new(tier, max_slots)).max_slots = max_slots;
    }

    pub async fn can_acquire(&self, tier: ResourceTier) -> bool {
        let state = self.state.lock().await;
        state.slots.get(&tier).is_some_and(ResourceSlot::has_capacity)
    }

    /// Attempt to acquire a slot for `task_id` in `tier`. Returns `false`
    /// without side effects if no capacity is available.
    pub async fn acquire(&self, tier: ResourceTier, task_id: Uuid) -> bool {
        let acquired = {
            let mut state = self.state.lock().await;
            let slot = state.slots.entry(tier).or_insert_with(|| ResourceSlot::new(tier, tier.default_max_slots()));
            if slot.has_capacity() {
                slot.active_tasks.insert(task_id);
                true
            } else {
                false
            }
        };
        if acquired {
            self.events.publish_resource_acquired(tier, task_id).await;
        }
        acquired
    }

    /// Release `task_id`'s slot, scanning all tiers since the caller need
    /// not remember which tier it held. Idempotent and safe for unknown
    /// task ids.
    pub async fn release(&self, task_id: Uuid) {
        let released_tier = {
            let mut state = self.state.lock().await;
            let mut found = None;
            for (tier, slot) in state.slots.iter_mut() {
                if slot.active_tasks.remove(&task_id) {
                    found = Some(*tier);
                    break;
                }
            }
            found
        };
        if let Some(tier) = released_tier {
            self.events.publish_resource_released(tier, task_id).await;
        }
    }

    pub async fn has_resource(&self, task_id: Uuid) -> bool {
        let state = self.state.lock().await;
        state.slots.values().any(|slot| slot.active_tasks.contains(&task_id))
    }

    pub fn get_resource_for_task(use_cloud: bool) -> ResourceTier {
        ResourceTier::for_use_cloud(use_cloud)
    }

    pub fn get_resource_for_complexity(complexity: u8) -> ResourceTier {
        ResourceTier::for_complexity(complexity)
    }

    pub async fn active_count(&self, tier: ResourceTier) -> usize {
        let state = self.state.lock().await;
        state.slots.get(&tier).map(|s| s.active_tasks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_tier_has_single_slot() {
        let pool = ResourcePool::new(EventBus::new_for_test());
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        assert!(pool.acquire(ResourceTier::Local, t1).await);
        assert!(!pool.acquire(ResourceTier::Local, t2).await);
        pool.release(t1).await;
        assert!(pool.acquire(ResourceTier::Local, t2).await);
    }

    #[tokio::test]
    async fn cloud_tier_has_two_slots() {
        let pool = ResourcePool::new(EventBus::new_for_test());
        let (t1, t2, t3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(pool.acquire(ResourceTier::Cloud, t1).await);
        assert!(pool.acquire(ResourceTier::Cloud, t2).await);
        assert!(!pool.acquire(ResourceTier::Cloud, t3).await);
    }

    #[tokio::test]
    async fn release_is_idempotent_for_unknown_task() {
        let pool = ResourcePool::new(EventBus::new_for_test());
        pool.release(Uuid::new_v4()).await;
        pool.release(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn complexity_below_ten_maps_to_local() {
        assert_eq!(ResourcePool::get_resource_for_complexity(9), ResourceTier::Local);
        assert_eq!(ResourcePool::get_resource_for_complexity(10), ResourceTier::Cloud);
    }
}
