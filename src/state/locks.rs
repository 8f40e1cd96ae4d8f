use crate::types::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per player, serializing multi-step updates of that
/// player's documents. Requests for different players never contend.
#[derive(Debug, Clone, Default)]
pub struct PlayerLocks {
    locks: Arc<Mutex<HashMap<PlayerId, Arc<AsyncMutex<()>>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, player: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(player.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
