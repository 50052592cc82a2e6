//! Chat command parsing
//!
//! Turns the text of a mention into a `Command`. Parsing only; dispatch
//! lives in `console`.

use recallbot_core::{MemoryConfig, UserId};
use regex::Regex;
use std::sync::OnceLock;

/// Prompt recorded for a `recall N` that carries no text of its own.
pub const RECALL_DEFAULT_PROMPT: &str = "ログを読み取って要点だけ教えてください。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/clear` or `#clear`, alone.
    Clear,
    /// `recall N` anywhere in the text; `rest` is the text without it, or
    /// `RECALL_DEFAULT_PROMPT` when nothing else was said.
    Recall { lines: usize, rest: String },
    /// `/fresh <text>`: answer without conversation history.
    Fresh { rest: String },
    /// "call me X" phrasing.
    SetAlias { alias: String },
    Chat { text: String },
}

fn clear_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^[/#]clear$").expect("static regex"))
}

fn recall_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:^|\s)[/#]?recall\s+(\d+)").expect("static regex"))
}

fn fresh_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^[/#]?fresh\b\s*(.*)$").expect("static regex"))
}

fn alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(.+?)(?:って|と|で)(?:呼んで|読んで|呼称して)ほしい").expect("static regex")
    })
}

pub fn is_clear_request(text: &str) -> bool {
    clear_re().is_match(text.trim())
}

/// Requested line count of a `recall N` command.
pub fn extract_recall_request(text: &str) -> Option<usize> {
    let caps = recall_re().captures(text)?;
    // Digits only, so the only failure is overflow.
    Some(caps[1].parse::<usize>().unwrap_or(usize::MAX))
}

pub fn strip_recall_command(text: &str) -> String {
    recall_re().replace_all(text, "").trim().to_string()
}

/// Text after `/fresh`, or `None` when this is not a fresh request.
pub fn extract_fresh_request(text: &str) -> Option<String> {
    let caps = fresh_re().captures(text.trim())?;
    Some(caps[1].trim().to_string())
}

pub fn extract_alias_request(text: &str) -> Option<String> {
    let caps = alias_re().captures(text.trim())?;
    let candidate = caps[1].trim();
    (!candidate.is_empty()).then(|| candidate.to_string())
}

pub fn parse(text: &str) -> Command {
    let text = text.trim();
    if is_clear_request(text) {
        return Command::Clear;
    }
    if let Some(rest) = extract_fresh_request(text) {
        return Command::Fresh { rest };
    }
    if let Some(alias) = extract_alias_request(text) {
        return Command::SetAlias { alias };
    }
    if let Some(lines) = extract_recall_request(text) {
        let mut rest = strip_recall_command(text);
        if rest.is_empty() {
            rest = RECALL_DEFAULT_PROMPT.to_string();
        }
        return Command::Recall { lines, rest };
    }
    Command::Chat { text: text.to_string() }
}

/// At least one line; capped at `recall.max_window` for everyone but the
/// authorized user.
pub fn clamp_recall_lines(lines: usize, user: UserId, config: &MemoryConfig) -> usize {
    let lines = lines.max(1);
    if config.names.authorized_user == Some(user) {
        lines
    } else {
        lines.min(config.recall.max_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_request() {
        assert!(is_clear_request("/clear"));
        assert!(is_clear_request("#CLEAR"));
        assert!(!is_clear_request("clear"));
        assert!(!is_clear_request("/reset"));
        assert!(!is_clear_request("履歴クリア"));
    }

    #[test]
    fn test_fresh_request() {
        assert_eq!(extract_fresh_request("/fresh こんにちは").as_deref(), Some("こんにちは"));
        assert_eq!(extract_fresh_request("fresh こんにちは").as_deref(), Some("こんにちは"));
        assert_eq!(extract_fresh_request("/fresh").as_deref(), Some(""));
        assert_eq!(extract_fresh_request("hello"), None);
        assert_eq!(extract_fresh_request("freshly baked"), None);
    }

    #[test]
    fn test_recall_request() {
        assert_eq!(extract_recall_request("/recall 10 まとめて"), Some(10));
        assert_eq!(extract_recall_request("ねえ #Recall 3"), Some(3));
        assert_eq!(extract_recall_request("recall"), None);
        assert_eq!(strip_recall_command("/recall 10 まとめて"), "まとめて");
    }

    #[test]
    fn test_bare_recall_gets_default_prompt() {
        assert_eq!(
            parse("/recall 4"),
            Command::Recall { lines: 4, rest: RECALL_DEFAULT_PROMPT.to_string() }
        );
        assert_eq!(parse("/recall 4 要約して"), Command::Recall { lines: 4, rest: "要約して".to_string() });
    }

    #[test]
    fn test_clamp_without_authorized_user() {
        let mut config = MemoryConfig::default();
        assert_eq!(clamp_recall_lines(500, UserId(0), &config), config.recall.max_window);
        assert_eq!(clamp_recall_lines(0, UserId(0), &config), 1);

        config.names.authorized_user = Some(UserId(0));
        assert_eq!(clamp_recall_lines(500, UserId(0), &config), 500);
    }

    #[test]
    fn test_alias_request() {
        assert_eq!(extract_alias_request("みかって呼んでほしい").as_deref(), Some("みか"));
        assert_eq!(extract_alias_request("「ミカ」と呼称してほしい").as_deref(), Some("「ミカ」"));
        assert_eq!(extract_alias_request("こんにちは"), None);
    }
}
