//! Per-scope display aliases with one reserved value
//!
//! Aliases are kept in memory and written through to
//! `<data_dir>/aliases/<encoded scope>.json` (a `{ "<user id>": "<alias>" }`
//! object). The reserved alias is decided by `AliasPolicy` before anything
//! is mutated.

use crate::log_store::{decode_component, encode_component};
use dashmap::DashMap;
use recallbot_core::{Error, NamesConfig, Result, Scope, UserId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const WRAPPERS: [(&str, &str); 5] = [("「", "」"), ("『", "』"), ("\"", "\""), ("'", "'"), ("`", "`")];

/// Trim and strip one pair of wrapping quotes.
pub fn normalize_alias(raw: &str) -> String {
    let stripped = raw.trim();
    for (start, end) in WRAPPERS {
        if stripped.len() > start.len()
            && stripped.starts_with(start)
            && stripped.ends_with(end)
        {
            return stripped[start.len()..stripped.len() - end.len()].trim().to_string();
        }
    }
    stripped.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasDecision {
    Allowed,
    Denied,
}

#[derive(Debug, Clone)]
pub struct AliasPolicy {
    reserved: String,
    authorized: Option<UserId>,
}

impl AliasPolicy {
    pub fn new(reserved: impl Into<String>, authorized: impl Into<Option<UserId>>) -> Self {
        Self { reserved: normalize_alias(&reserved.into()), authorized: authorized.into() }
    }

    pub fn from_config(config: &NamesConfig) -> Self {
        Self::new(config.reserved_alias.clone(), config.authorized_user)
    }

    pub fn reserved(&self) -> &str {
        &self.reserved
    }

    pub fn authorized(&self) -> Option<UserId> {
        self.authorized
    }

    pub fn is_authorized(&self, user: UserId) -> bool {
        self.authorized == Some(user)
    }

    /// The reserved value itself, or the reserved value with anything
    /// appended (an honorific, for instance).
    pub fn is_reserved(&self, alias: &str) -> bool {
        normalize_alias(alias).starts_with(&self.reserved)
    }

    pub fn check(&self, user: UserId, alias: &str) -> AliasDecision {
        if self.is_reserved(alias) && !self.is_authorized(user) {
            AliasDecision::Denied
        } else {
            AliasDecision::Allowed
        }
    }
}

type ScopeAliases = Arc<Mutex<BTreeMap<UserId, String>>>;

pub struct NamingRegistry {
    policy: AliasPolicy,
    dir: Option<PathBuf>,
    scopes: DashMap<Scope, ScopeAliases>,
}

impl NamingRegistry {
    /// Registry without persistence.
    pub fn in_memory(policy: AliasPolicy) -> Self {
        Self { policy, dir: None, scopes: DashMap::new() }
    }

    /// Registry persisted under `<data_dir>/aliases/`, loading what is there.
    /// Unreadable files are skipped with a warning.
    pub async fn open(policy: AliasPolicy, data_dir: &Path) -> Self {
        let dir = data_dir.join("aliases");
        let registry = Self { policy, dir: Some(dir.clone()), scopes: DashMap::new() };

        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return registry;
        };
        let mut loaded = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Some(scope) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(decode_component)
            else {
                continue;
            };
            match read_scope_file(&path).await {
                Ok(map) => {
                    loaded += map.len();
                    registry.scopes.insert(Scope::from(scope), Arc::new(Mutex::new(map)));
                }
                Err(e) => warn!("Skipping alias file {}: {}", path.display(), e),
            }
        }
        info!("Loaded {} aliases from {}", loaded, dir.display());
        registry
    }

    pub fn policy(&self) -> &AliasPolicy {
        &self.policy
    }

    fn scope(&self, scope: &Scope) -> ScopeAliases {
        self.scopes.entry(scope.clone()).or_default().clone()
    }

    /// Store an alias for `user` in `scope`, overwriting any previous one.
    /// Returns the normalized alias that was stored.
    pub async fn set_alias(&self, scope: &Scope, user: UserId, alias: &str) -> Result<String> {
        let alias = normalize_alias(alias);
        if alias.is_empty() {
            return Err(Error::InvalidAlias("alias is empty".to_string()));
        }
        if self.policy.check(user, &alias) == AliasDecision::Denied {
            warn!("Rejected reserved alias {:?} for user {} in {}", alias, user, scope);
            return Err(Error::unauthorized(user, alias));
        }

        let slot = self.scope(scope);
        let mut map = slot.lock().await;
        map.insert(user, alias.clone());
        info!("Alias set scope={} user={} alias={:?}", scope, user, alias);

        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{}.json", encode_component(scope.as_str())));
            if let Err(e) = write_scope_file(&path, &map).await {
                warn!("Alias kept in memory only, persisting {} failed: {}", path.display(), e);
            }
        }
        Ok(alias)
    }

    /// Stored alias, or `fallback` when none is set.
    pub async fn resolve_alias(&self, scope: &Scope, user: UserId, fallback: &str) -> String {
        self.stored(scope, user).await.unwrap_or_else(|| fallback.to_string())
    }

    /// Name to present for `user`. The authorized identity always gets the
    /// reserved alias; anyone else whose alias or fallback is blank or
    /// reserved is shown as `user-<id>`.
    pub async fn call_name(&self, scope: &Scope, user: UserId, fallback: &str) -> String {
        if self.policy.is_authorized(user) {
            return self.policy.reserved().to_string();
        }
        let candidate = normalize_alias(&self.resolve_alias(scope, user, fallback).await);
        if candidate.is_empty() || self.policy.is_reserved(&candidate) {
            format!("user-{}", user)
        } else {
            candidate
        }
    }

    async fn stored(&self, scope: &Scope, user: UserId) -> Option<String> {
        let slot = self.scopes.get(scope).map(|s| s.clone())?;
        let map = slot.lock().await;
        map.get(&user).cloned()
    }
}

async fn read_scope_file(path: &Path) -> Result<BTreeMap<UserId, String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn write_scope_file(path: &Path, map: &BTreeMap<UserId, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(map)?;
    // Write-then-rename so a crash never leaves a half-written file.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_wrappers() {
        assert_eq!(normalize_alias("「しゆい」"), "しゆい");
        assert_eq!(normalize_alias("  'mika' "), "mika");
        assert_eq!(normalize_alias("「"), "「");
        assert_eq!(normalize_alias("plain"), "plain");
    }

    #[test]
    fn test_reserved_prefix() {
        let policy = AliasPolicy::new("しゆい", UserId(2));
        assert!(policy.is_reserved("しゆい"));
        assert!(policy.is_reserved("しゆい様"));
        assert!(policy.is_reserved("『しゆい』"));
        assert!(!policy.is_reserved("ゆい"));
    }

    #[test]
    fn test_policy_decision() {
        let policy = AliasPolicy::new("しゆい", UserId(2));
        assert_eq!(policy.check(UserId(1), "しゆい"), AliasDecision::Denied);
        assert_eq!(policy.check(UserId(2), "しゆい"), AliasDecision::Allowed);
        assert_eq!(policy.check(UserId(1), "mika"), AliasDecision::Allowed);
    }

    #[test]
    fn test_unset_authorized_denies_everyone() {
        let policy = AliasPolicy::new("しゆい", None::<UserId>);
        assert_eq!(policy.check(UserId(0), "しゆい"), AliasDecision::Denied);
        assert!(!policy.is_authorized(UserId(0)));
        assert_eq!(policy.check(UserId(0), "mika"), AliasDecision::Allowed);
    }
}
