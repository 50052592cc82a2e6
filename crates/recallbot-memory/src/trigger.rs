//! Post-append hook and the keyword trigger behind automatic recall

use crate::recall::{RecallParams, SelectionPolicy};
use recallbot_core::{AutoRecallConfig, Turn};

/// A recall the engine should run before handing context downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallRequest {
    pub params: RecallParams,
    pub policy: SelectionPolicy,
    /// What caused the request, for logging.
    pub reason: String,
}

/// The single extension point run synchronously after a user turn has been
/// appended to memory.
pub trait PostAppendHook: Send + Sync {
    fn after_append(&self, turn: &Turn) -> Option<RecallRequest>;
}

/// Literal, case-sensitive substring match against a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordTrigger {
    keywords: Vec<String>,
    params: RecallParams,
}

impl KeywordTrigger {
    pub fn new(keywords: Vec<String>, params: RecallParams) -> Self {
        Self { keywords, params }
    }

    pub fn from_config(config: &AutoRecallConfig) -> Self {
        Self::new(config.keywords.clone(), RecallParams::new(config.window, config.pick))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn params(&self) -> RecallParams {
        self.params
    }

    pub fn matches(&self, text: &str) -> bool {
        self.first_match(text).is_some()
    }

    /// First configured keyword (in list order) found in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| !k.is_empty() && text.contains(k.as_str()))
            .map(String::as_str)
    }
}

impl PostAppendHook for KeywordTrigger {
    fn after_append(&self, turn: &Turn) -> Option<RecallRequest> {
        let keyword = self.first_match(&turn.text)?;
        Some(RecallRequest {
            params: self.params,
            policy: SelectionPolicy::MostRecent,
            reason: format!("keyword {:?}", keyword),
        })
    }
}
