//! Recallbot Memory - bounded per-surface conversation memory backed by
//! append-only logs, with manual and keyword-triggered recall

pub mod bootstrap;
pub mod channel;
pub mod engine;
pub mod log_store;
pub mod names;
pub mod recall;
pub mod trigger;

pub use bootstrap::{BootstrapReport, Bootstrapper};
pub use channel::{ChannelMemory, ChannelMemoryStore, SurfaceState};
pub use engine::{AppendOutcome, ConversationEngine, InboundMessage, MessageOutcome};
pub use log_store::LogStore;
pub use names::{normalize_alias, AliasDecision, AliasPolicy, NamingRegistry};
pub use recall::{render_recall_block, select, RecallEngine, RecallOutcome, RecallParams, SelectionPolicy};
pub use trigger::{KeywordTrigger, PostAppendHook, RecallRequest};
