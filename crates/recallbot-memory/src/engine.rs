//! Conversation engine — the facade the platform and command layers talk to
//!
//! Every mutation of a surface (append, recall merge, clear, bootstrap)
//! happens while holding that surface's lock. A surface that has not been
//! bootstrapped yet is populated from its log under the same lock before the
//! first live turn lands, so live turns always follow the replayed tail.

use crate::bootstrap::{BootstrapReport, Bootstrapper};
use crate::channel::{ChannelMemoryStore, SurfaceState};
use crate::log_store::LogStore;
use crate::names::{AliasPolicy, NamingRegistry};
use crate::recall::{RecallEngine, RecallOutcome, RecallParams, SelectionPolicy};
use crate::trigger::{KeywordTrigger, PostAppendHook};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use recallbot_core::{Error, MemoryConfig, NewTurn, Result, Scope, SurfaceKey, Turn, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A live message delivered by the platform collaborator.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub surface: SurfaceKey,
    pub scope: Scope,
    pub sender: UserId,
    pub text: String,
    /// Platform display name, used when the sender has no alias.
    pub display_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// When false the post-append hook is skipped (a manual recall already
    /// covers this turn).
    pub auto_recall: bool,
}

impl InboundMessage {
    pub fn new(
        surface: impl Into<SurfaceKey>,
        scope: impl Into<Scope>,
        sender: UserId,
        display_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            surface: surface.into(),
            scope: scope.into(),
            sender,
            text: text.into(),
            display_name: display_name.into(),
            timestamp: None,
            auto_recall: true,
        }
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn without_auto_recall(mut self) -> Self {
        self.auto_recall = false;
        self
    }
}

#[derive(Debug)]
pub struct AppendOutcome {
    pub turn: Turn,
    /// Set when the log write failed. The turn is in memory regardless.
    pub log_error: Option<Error>,
}

#[derive(Debug)]
pub struct MessageOutcome {
    pub turn: Turn,
    pub log_error: Option<Error>,
    /// Present when the post-append hook asked for a recall.
    pub recall: Option<RecallOutcome>,
    /// Surface memory after the turn and any recall, for context assembly.
    pub context: Vec<Turn>,
}

pub struct ConversationEngine {
    config: MemoryConfig,
    log: Arc<LogStore>,
    memory: ChannelMemoryStore,
    names: NamingRegistry,
    recall: RecallEngine,
    bootstrapper: Bootstrapper,
    hook: Box<dyn PostAppendHook>,
}

impl ConversationEngine {
    /// Validate `config`, then open the log store and alias registry under
    /// `config.data_dir`.
    pub async fn open(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        let names = NamingRegistry::open(AliasPolicy::from_config(&config.names), &config.data_dir).await;
        Ok(Self::with_registry(config, names))
    }

    pub fn with_registry(config: MemoryConfig, names: NamingRegistry) -> Self {
        let log = Arc::new(LogStore::new(&config.data_dir));
        let hook: Box<dyn PostAppendHook> = Box::new(KeywordTrigger::from_config(&config.auto_recall));
        Self {
            memory: ChannelMemoryStore::new(config.max_history),
            recall: RecallEngine::new(log.clone()),
            bootstrapper: Bootstrapper::new(log.clone(), config.bootstrap_lines),
            log,
            names,
            hook,
            config,
        }
    }

    /// Replace the post-append hook (the keyword trigger by default).
    pub fn with_hook(mut self, hook: impl PostAppendHook + 'static) -> Self {
        self.hook = Box::new(hook);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn log(&self) -> &LogStore {
        &self.log
    }

    pub fn names(&self) -> &NamingRegistry {
        &self.names
    }

    pub fn memory(&self) -> &ChannelMemoryStore {
        &self.memory
    }

    // ---------------------------------------------------------------------
    // Bootstrap
    // ---------------------------------------------------------------------

    /// Populate every surface that has log history. Surfaces load
    /// concurrently; a failing surface is logged and left empty. Surfaces
    /// already populated in this process are skipped.
    pub async fn bootstrap(&self) -> BootstrapReport {
        let surfaces = self.log.surfaces().await;
        info!("Bootstrapping {} surfaces (tail {})", surfaces.len(), self.bootstrapper.tail_lines());

        let results = join_all(surfaces.into_iter().map(|surface| async move {
            let mut state = self.memory.lock(&surface).await;
            if state.bootstrapped {
                return (surface, None);
            }
            let result = self.bootstrapper.load(&surface, &mut state).await;
            if result.is_err() {
                self.bootstrapper.recover(&surface, &mut state).await;
            }
            (surface, Some(result))
        }))
        .await;

        let mut report = BootstrapReport::default();
        for (surface, result) in results {
            match result {
                None => report.skipped.push(surface),
                Some(Ok(held)) => report.loaded.push((surface, held)),
                Some(Err(e)) => {
                    warn!("Bootstrap failed for surface={}, starting empty: {}", surface, e);
                    report.failed.push((surface, e.to_string()));
                }
            }
        }
        info!(
            "Bootstrap done: {} loaded ({} turns), {} failed, {} skipped",
            report.loaded.len(),
            report.total_turns(),
            report.failed.len(),
            report.skipped.len()
        );
        report
    }

    async fn ensure_bootstrapped(&self, surface: &SurfaceKey, state: &mut SurfaceState) {
        if state.bootstrapped {
            return;
        }
        if let Err(e) = self.bootstrapper.load(surface, state).await {
            warn!("Bootstrap failed for surface={}, starting empty: {}", surface, e);
            self.bootstrapper.recover(surface, state).await;
        }
    }

    async fn append_locked(&self, surface: &SurfaceKey, state: &mut SurfaceState, new: NewTurn) -> AppendOutcome {
        let outcome = self.log_locked(surface, state, new).await;
        state.memory.push(outcome.turn.clone());
        debug!("Appended turn surface={} ordinal={} held={}", surface, outcome.turn.ordinal, state.memory.len());
        outcome
    }

    /// Assign the next ordinal and write the turn to the log only.
    async fn log_locked(&self, surface: &SurfaceKey, state: &mut SurfaceState, new: NewTurn) -> AppendOutcome {
        let ordinal = state.next_ordinal;
        state.next_ordinal += 1;
        let turn = new.into_turn(surface.clone(), ordinal);

        let log_error = self.log.append(&turn).await.err();
        if let Some(e) = &log_error {
            warn!("Turn {} of surface={} not logged: {}", ordinal, surface, e);
        }
        AppendOutcome { turn, log_error }
    }

    // ---------------------------------------------------------------------
    // Inbound / outbound
    // ---------------------------------------------------------------------

    /// Resolve the sender's name, log and remember the turn, then run the
    /// post-append hook (and its recall) before returning the context.
    pub async fn on_message(&self, msg: InboundMessage) -> MessageOutcome {
        let alias = self.names.call_name(&msg.scope, msg.sender, &msg.display_name).await;
        let mut new = NewTurn::user(msg.sender, alias, msg.text);
        if let Some(ts) = msg.timestamp {
            new = new.at(ts);
        }

        let surface = msg.surface;
        let mut state = self.memory.lock(&surface).await;
        self.ensure_bootstrapped(&surface, &mut state).await;
        let AppendOutcome { turn, log_error } = self.append_locked(&surface, &mut state, new).await;

        let request = if msg.auto_recall { self.hook.after_append(&turn) } else { None };
        let recall = match request {
            Some(request) => {
                info!("Auto recall on surface={} ({})", surface, request.reason);
                Some(
                    self.recall
                        .recall_into(&surface, &mut state.memory, request.params, &request.policy)
                        .await,
                )
            }
            None => None,
        };

        MessageOutcome { turn, log_error, recall, context: state.memory.turns() }
    }

    /// Record the assistant's reply on `surface`.
    pub async fn on_reply(
        &self,
        surface: &SurfaceKey,
        bot: UserId,
        bot_name: &str,
        text: impl Into<String>,
    ) -> AppendOutcome {
        let mut state = self.memory.lock(surface).await;
        self.ensure_bootstrapped(surface, &mut state).await;
        self.append_locked(surface, &mut state, NewTurn::assistant(bot, bot_name, text)).await
    }

    /// Write a command exchange (the user's request and the bot's answer) to
    /// the log without adding either turn to memory.
    pub async fn log_exchange(
        &self,
        msg: InboundMessage,
        bot: UserId,
        bot_name: &str,
        answer: impl Into<String>,
    ) -> Vec<AppendOutcome> {
        let alias = self.names.call_name(&msg.scope, msg.sender, &msg.display_name).await;
        let mut request = NewTurn::user(msg.sender, alias, msg.text);
        if let Some(ts) = msg.timestamp {
            request = request.at(ts);
        }

        let mut state = self.memory.lock(&msg.surface).await;
        self.ensure_bootstrapped(&msg.surface, &mut state).await;
        let mut outcomes = Vec::with_capacity(2);
        outcomes.push(self.log_locked(&msg.surface, &mut state, request).await);
        outcomes.push(self.log_locked(&msg.surface, &mut state, NewTurn::assistant(bot, bot_name, answer)).await);
        outcomes
    }

    /// Read-only snapshot for context assembly.
    pub async fn get_context(&self, surface: &SurfaceKey) -> Vec<Turn> {
        self.memory.get(surface).await
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    /// Empty the surface's memory. Log history is kept.
    pub async fn clear(&self, surface: &SurfaceKey) {
        let mut state = self.memory.lock(surface).await;
        self.ensure_bootstrapped(surface, &mut state).await;
        state.memory.clear();
        info!("Cleared memory for surface={}", surface);
    }

    /// Manual recall. Missing values fall back to the configured defaults.
    pub async fn recall(&self, surface: &SurfaceKey, window: Option<usize>, pick: Option<usize>) -> RecallOutcome {
        let params = RecallParams::new(
            window.unwrap_or(self.config.recall.default_window),
            pick.unwrap_or(self.config.recall.default_pick),
        );
        self.recall_with(surface, params, &SelectionPolicy::MostRecent).await
    }

    /// Recall with the automatic parameters; never caller-overridable.
    pub async fn auto_recall(&self, surface: &SurfaceKey) -> RecallOutcome {
        let params = RecallParams::new(self.config.auto_recall.window, self.config.auto_recall.pick);
        self.recall_with(surface, params, &SelectionPolicy::MostRecent).await
    }

    pub async fn recall_with(
        &self,
        surface: &SurfaceKey,
        params: RecallParams,
        policy: &SelectionPolicy,
    ) -> RecallOutcome {
        let mut state = self.memory.lock(surface).await;
        self.ensure_bootstrapped(surface, &mut state).await;
        self.recall.recall_into(surface, &mut state.memory, params, policy).await
    }

    pub async fn set_alias(&self, scope: &Scope, user: UserId, alias: &str) -> Result<String> {
        self.names.set_alias(scope, user, alias).await
    }

    pub async fn resolve_alias(&self, scope: &Scope, user: UserId, fallback: &str) -> String {
        self.names.resolve_alias(scope, user, fallback).await
    }
}
