//! Startup replay of log tails into surface memory

use crate::channel::SurfaceState;
use crate::log_store::LogStore;
use recallbot_core::{Result, SurfaceKey};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    /// Surfaces populated, with the number of turns held afterwards.
    pub loaded: Vec<(SurfaceKey, usize)>,
    /// Surfaces whose log could not be read. They start empty.
    pub failed: Vec<(SurfaceKey, String)>,
    /// Surfaces already populated earlier in this process.
    pub skipped: Vec<SurfaceKey>,
}

impl BootstrapReport {
    pub fn total_turns(&self) -> usize {
        self.loaded.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Clone)]
pub struct Bootstrapper {
    log: Arc<LogStore>,
    tail_lines: usize,
}

impl Bootstrapper {
    pub fn new(log: Arc<LogStore>, tail_lines: usize) -> Self {
        Self { log, tail_lines }
    }

    pub fn tail_lines(&self) -> usize {
        self.tail_lines
    }

    /// Merge the surface's log tail into `state` and advance its ordinal
    /// counter past every record in the log, including ones outside the
    /// tail or behind a torn final line. The merge is keyed by ordinal, so
    /// loading twice leaves the same state as loading once. The caller
    /// holds the surface lock.
    pub async fn load(&self, surface: &SurfaceKey, state: &mut SurfaceState) -> Result<usize> {
        let tail = self.log.try_read_tail(surface, self.tail_lines).await?;
        let mut next = self.log.next_ordinal(surface).await?;
        if let Some(newest) = tail.iter().map(|t| t.ordinal).max() {
            next = next.max(newest + 1);
        }
        state.next_ordinal = state.next_ordinal.max(next);

        state.memory.merge(tail);
        state.bootstrapped = true;
        info!(
            "Bootstrapped surface={} held={} next_ordinal={}",
            surface,
            state.memory.len(),
            state.next_ordinal
        );
        Ok(state.memory.len())
    }

    /// Settle a surface whose log could not be read: it starts empty, and
    /// its ordinals start past anything the file could hold (a record is
    /// never shorter than one byte).
    pub async fn recover(&self, surface: &SurfaceKey, state: &mut SurfaceState) {
        let floor = self.log.byte_len(surface).await;
        state.next_ordinal = state.next_ordinal.max(floor);
        state.bootstrapped = true;
        warn!("Surface={} starts empty, next_ordinal={}", surface, state.next_ordinal);
    }
}
