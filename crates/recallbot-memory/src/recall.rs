//! Recall — pull a slice of older log content back into a surface's memory
//!
//! A recall reads a tail window from the log, picks a subset of it, and
//! merges the pick into the surface's `ChannelMemory` keyed by ordinal, so
//! recalling the same records twice is a no-op.

use crate::channel::ChannelMemory;
use crate::log_store::LogStore;
use recallbot_core::{SurfaceKey, Turn};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Window/pick pair. `pick` never exceeds `window` once clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecallParams {
    pub window: usize,
    pub pick: usize,
}

impl RecallParams {
    pub fn new(window: usize, pick: usize) -> Self {
        Self { window, pick }
    }

    pub fn clamped(self) -> Self {
        Self { window: self.window, pick: self.pick.min(self.window) }
    }
}

/// How records are chosen from the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// The newest `pick` records of the window.
    #[default]
    MostRecent,
    /// Records containing the most distinct `terms` win; ties go to the
    /// newer record.
    KeywordWeighted { terms: Vec<String> },
}

#[derive(Debug, Clone, Default)]
pub struct RecallOutcome {
    /// Records read from the log window.
    pub window_read: usize,
    /// Records selected from the window, chronological.
    pub picked: Vec<Turn>,
    /// Picked records that are held in memory after the merge and were not
    /// there before.
    pub merged: usize,
}

/// Pick `pick` records out of `window` (chronological) according to `policy`.
/// The result is chronological.
pub fn select(window: &[Turn], pick: usize, policy: &SelectionPolicy) -> Vec<Turn> {
    if pick >= window.len() {
        return window.to_vec();
    }
    match policy {
        SelectionPolicy::MostRecent => window[window.len() - pick..].to_vec(),
        SelectionPolicy::KeywordWeighted { terms } => {
            let terms: HashSet<&str> =
                terms.iter().map(String::as_str).filter(|t| !t.is_empty()).collect();
            let mut ranked: Vec<(usize, &Turn)> = window
                .iter()
                .map(|t| (terms.iter().filter(|term| t.text.contains(**term)).count(), t))
                .collect();
            ranked.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then(b.ordinal.cmp(&a.ordinal)));
            let mut chosen: Vec<Turn> = ranked.into_iter().take(pick).map(|(_, t)| t.clone()).collect();
            chosen.sort_by_key(|t| t.ordinal);
            chosen
        }
    }
}

/// Format records as `[<ts>] <alias> (<role>): <text>` lines, one per turn.
pub fn render_recall_block(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("[{}] {} ({}): {}", t.ts.format("%Y-%m-%dT%H:%M:%S%:z"), t.alias, t.role, t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
pub struct RecallEngine {
    log: Arc<LogStore>,
}

impl RecallEngine {
    pub fn new(log: Arc<LogStore>) -> Self {
        Self { log }
    }

    /// Read the window and select from it. Read failures yield an empty pick.
    pub async fn collect(
        &self,
        surface: &SurfaceKey,
        params: RecallParams,
        policy: &SelectionPolicy,
    ) -> RecallOutcome {
        let params = params.clamped();
        let window = self.log.read_tail(surface, params.window).await;
        let picked = select(&window, params.pick, policy);
        RecallOutcome { window_read: window.len(), picked, merged: 0 }
    }

    /// Collect and merge into `memory`. The caller holds the surface lock.
    pub async fn recall_into(
        &self,
        surface: &SurfaceKey,
        memory: &mut ChannelMemory,
        params: RecallParams,
        policy: &SelectionPolicy,
    ) -> RecallOutcome {
        let mut outcome = self.collect(surface, params, policy).await;
        outcome.merged = memory.merge(outcome.picked.iter().cloned());
        info!(
            "Recall surface={} window={} read={} picked={} merged={}",
            surface,
            params.window,
            outcome.window_read,
            outcome.picked.len(),
            outcome.merged
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recallbot_core::{NewTurn, UserId};

    fn window(texts: &[&str]) -> Vec<Turn> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| NewTurn::user(UserId(1), "a", *t).into_turn("s".into(), i as u64))
            .collect()
    }

    #[test]
    fn test_clamp_pick_to_window() {
        assert_eq!(RecallParams::new(4, 9).clamped(), RecallParams::new(4, 4));
        assert_eq!(RecallParams::new(9, 4).clamped(), RecallParams::new(9, 4));
    }

    #[test]
    fn test_most_recent_takes_tail() {
        let w = window(&["a", "b", "c", "d"]);
        let picked: Vec<u64> = select(&w, 2, &SelectionPolicy::MostRecent).iter().map(|t| t.ordinal).collect();
        assert_eq!(picked, vec![2, 3]);
    }

    #[test]
    fn test_keyword_weighted_tie_breaks_on_recency() {
        let w = window(&["cat dog", "cat", "nothing", "dog", "cat"]);
        let policy = SelectionPolicy::KeywordWeighted { terms: vec!["cat".into(), "dog".into()] };
        let picked: Vec<u64> = select(&w, 3, &policy).iter().map(|t| t.ordinal).collect();
        // "cat dog" scores 2; ordinals 4 and 3 beat 1 on recency.
        assert_eq!(picked, vec![0, 3, 4]);
    }
}
