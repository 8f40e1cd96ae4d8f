use crate::types::{PlayerId, ScoreRecord};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Latest score record per player.
///
/// Write-through and best effort: entries are only ever replaced whole, never
/// evicted, and the cache starts empty on every process start. It never holds
/// history, so anything that needs earlier rounds must query the store.
#[derive(Debug, Clone, Default)]
pub struct ScoreCache {
    entries: Arc<RwLock<HashMap<PlayerId, ScoreRecord>>>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Values are replaced whole, so a poisoned lock still guards consistent data
    fn read(&self) -> RwLockReadGuard<'_, HashMap<PlayerId, ScoreRecord>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PlayerId, ScoreRecord>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, player: &str) -> Option<ScoreRecord> {
        self.read().get(player).cloned()
    }

    /// Store a record as the player's latest, replacing any earlier entry
    pub fn insert(&self, record: ScoreRecord) {
        self.write().insert(record.player_id.clone(), record);
    }

    /// Whether the cached record reaches `total_rounds`; `None` on a miss
    pub fn reached_round(&self, player: &str, total_rounds: u32) -> Option<bool> {
        self.read()
            .get(player)
            .map(|record| record.rounds >= total_rounds)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
