//! Core types for Recallbot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(Arc::from(s.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0.to_string()
            }
        }
    };
}

string_key! {
    /// Conversation surface (channel or thread) - cheaply cloneable.
    /// Memory and logs are isolated per surface.
    SurfaceKey
}

string_key! {
    /// Alias scope, usually the guild a surface belongs to (`dm` outside guilds).
    Scope
}

/// Platform user identity.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Who produced a turn.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

/// One recorded exchange unit. Immutable once appended; `ordinal` is its
/// position in the surface's log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub surface: SurfaceKey,
    pub ordinal: u64,
    #[serde(default)]
    pub role: Role,
    pub speaker: UserId,
    pub alias: String,
    pub text: String,
    pub ts: DateTime<Utc>,
}

/// A turn that has not been assigned an ordinal yet.
#[derive(Clone, Debug)]
pub struct NewTurn {
    pub role: Role,
    pub speaker: UserId,
    pub alias: String,
    pub text: String,
    pub ts: DateTime<Utc>,
}

impl NewTurn {
    pub fn user(speaker: UserId, alias: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            speaker,
            alias: alias.into(),
            text: text.into(),
            ts: Utc::now(),
        }
    }

    pub fn assistant(speaker: UserId, alias: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            speaker,
            alias: alias.into(),
            text: text.into(),
            ts: Utc::now(),
        }
    }

    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.ts = ts;
        self
    }

    pub fn into_turn(self, surface: SurfaceKey, ordinal: u64) -> Turn {
        Turn {
            surface,
            ordinal,
            role: self.role,
            speaker: self.speaker,
            alias: self.alias,
            text: self.text,
            ts: self.ts,
        }
    }
}
