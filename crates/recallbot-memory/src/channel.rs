//! Bounded per-surface conversation buffers
//!
//! Each surface owns a `ChannelMemory` behind its own mutex. Surfaces never
//! share a lock, so unrelated channels make progress independently, while
//! append / merge / clear / bootstrap on one surface are serialized.

use dashmap::DashMap;
use recallbot_core::{SurfaceKey, Turn};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Ordered turns for one surface, ascending by ordinal, never longer than
/// `capacity`. Overflow evicts from the head.
#[derive(Debug, Clone)]
pub struct ChannelMemory {
    capacity: usize,
    turns: VecDeque<Turn>,
}

impl ChannelMemory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, turns: VecDeque::with_capacity(capacity.min(256)) }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn contains(&self, ordinal: u64) -> bool {
        self.turns.binary_search_by_key(&ordinal, |t| t.ordinal).is_ok()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Insert at the tail. Returns how many turns were evicted.
    pub fn push(&mut self, turn: Turn) -> usize {
        let in_order = self.turns.back().map_or(true, |last| last.ordinal < turn.ordinal);
        if in_order {
            self.turns.push_back(turn);
        } else {
            // Out-of-order or repeated ordinal: fall back to a keyed insert.
            self.insert_sorted(turn);
        }
        self.evict()
    }

    /// Merge turns keyed by ordinal. Turns already present are skipped, the
    /// rest are placed in ordinal order, then the head is evicted down to
    /// capacity. Returns how many merged turns are still held afterwards.
    pub fn merge(&mut self, turns: impl IntoIterator<Item = Turn>) -> usize {
        let mut merged = Vec::new();
        for turn in turns {
            let ordinal = turn.ordinal;
            if self.insert_sorted(turn) {
                merged.push(ordinal);
            }
        }
        self.evict();
        merged.into_iter().filter(|o| self.contains(*o)).count()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn insert_sorted(&mut self, turn: Turn) -> bool {
        match self.turns.binary_search_by_key(&turn.ordinal, |t| t.ordinal) {
            Ok(_) => false,
            Err(idx) => {
                self.turns.insert(idx, turn);
                true
            }
        }
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
            evicted += 1;
        }
        evicted
    }
}

/// Everything the engine mutates for one surface under a single lock.
#[derive(Debug)]
pub struct SurfaceState {
    pub memory: ChannelMemory,
    /// Ordinal the next appended turn receives.
    pub next_ordinal: u64,
    /// Set once the surface has been populated from its log.
    pub bootstrapped: bool,
}

impl SurfaceState {
    fn new(capacity: usize) -> Self {
        Self { memory: ChannelMemory::new(capacity), next_ordinal: 0, bootstrapped: false }
    }
}

pub struct ChannelMemoryStore {
    capacity: usize,
    slots: DashMap<SurfaceKey, Arc<Mutex<SurfaceState>>>,
}

impl ChannelMemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, slots: DashMap::new() }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, surface: &SurfaceKey) -> Arc<Mutex<SurfaceState>> {
        self.slots
            .entry(surface.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SurfaceState::new(self.capacity))))
            .clone()
    }

    /// Exclusive access to a surface, creating it on first use. The DashMap
    /// shard guard is released before awaiting the surface mutex.
    pub async fn lock(&self, surface: &SurfaceKey) -> OwnedMutexGuard<SurfaceState> {
        self.slot(surface).lock_owned().await
    }

    pub async fn append(&self, surface: &SurfaceKey, turn: Turn) {
        let mut state = self.lock(surface).await;
        let evicted = state.memory.push(turn);
        debug!("Memory append surface={} size={} evicted={}", surface, state.memory.len(), evicted);
    }

    /// Snapshot of the surface's buffer; empty for unseen surfaces.
    pub async fn get(&self, surface: &SurfaceKey) -> Vec<Turn> {
        let Some(slot) = self.slots.get(surface).map(|s| s.clone()) else {
            return Vec::new();
        };
        let state = slot.lock().await;
        debug!("Memory get surface={} size={}", surface, state.memory.len());
        state.memory.turns()
    }

    pub async fn merge(&self, surface: &SurfaceKey, turns: Vec<Turn>) -> usize {
        let mut state = self.lock(surface).await;
        state.memory.merge(turns)
    }

    /// Empty the buffer. The log is untouched.
    pub async fn clear(&self, surface: &SurfaceKey) {
        let Some(slot) = self.slots.get(surface).map(|s| s.clone()) else {
            return;
        };
        slot.lock().await.memory.clear();
        debug!("Memory cleared surface={}", surface);
    }

    pub fn surfaces(&self) -> Vec<SurfaceKey> {
        let mut keys: Vec<SurfaceKey> = self.slots.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
