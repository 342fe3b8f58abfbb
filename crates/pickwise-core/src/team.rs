// Canonical team identifiers.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TeamIdError {
    #[error("team id is empty")]
    Empty,
}

/// A team identifier in its single canonical string form.
///
/// Callers hand team numbers around as strings, integers, or JSON numbers.
/// Everything funnels through [`TeamId::parse`] so that `"0254"`, `" 254 "`
/// and `254` all name the same team. A blank string is not a team id; the
/// store APIs model the "empty sentinel" as `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeamId(String);

impl TeamId {
    /// Normalize a raw identifier. Returns `None` for blank input.
    ///
    /// - surrounding whitespace is trimmed
    /// - purely numeric ids lose leading zeros (`"0"` stays `"0"`)
    /// - anything else is kept verbatim (offseason ids like `"9971B"`)
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = trimmed.trim_start_matches('0');
            let canonical = if stripped.is_empty() { "0" } else { stripped };
            return Some(TeamId(canonical.to_string()));
        }
        Some(TeamId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TeamId {
    type Err = TeamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TeamId::parse(s).ok_or(TeamIdError::Empty)
    }
}

impl From<u32> for TeamId {
    fn from(number: u32) -> Self {
        TeamId(number.to_string())
    }
}

impl AsRef<str> for TeamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TeamId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TeamId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for TeamId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TeamId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TeamIdVisitor)
    }
}

/// Accepts both strings and integers; older blobs stored team numbers as
/// JSON numbers.
struct TeamIdVisitor;

impl<'de> Visitor<'de> for TeamIdVisitor {
    type Value = TeamId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a team number as a string or integer")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TeamId, E> {
        TeamId::parse(v).ok_or_else(|| E::custom("team id is empty"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TeamId, E> {
        Ok(TeamId(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TeamId, E> {
        if v < 0 {
            return Err(E::invalid_value(de::Unexpected::Signed(v), &self));
        }
        Ok(TeamId(v.to_string()))
    }
}
