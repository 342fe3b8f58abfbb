// In-memory picklist store: ordering and uniqueness rules plus mutations.

use serde::Deserialize;
use thiserror::Error;

use crate::picklist::{Picklist, PicklistSet};
use crate::query::PicklistQuery;
use crate::team::TeamId;

// ---------------------------------------------------------------------------
// Error and outcome types
// ---------------------------------------------------------------------------

/// Expected validation failures. Returned as values; the store never decides
/// what to tell the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PicklistError {
    #[error("list \"{name}\" already exists")]
    DuplicateName { name: String },

    #[error("list \"{name}\" does not exist")]
    NotFound { name: String },

    #[error("list name is empty")]
    EmptyName,
}

/// What happens when a caller removes a team that is not in the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Leave the list untouched and report [`Removal::Absent`].
    #[default]
    Strict,
    /// Reproduce the index -1 splice of older clients: the last team of the
    /// list is evicted and reported as [`Removal::Anomaly`].
    LegacySplice,
}

/// Outcome of [`PicklistStore::remove_team`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The team was removed from the list.
    Team,
    /// The empty sentinel was passed and the whole list was deleted.
    List,
    /// The team was not in the list; nothing changed.
    Absent,
    /// The team was not in the list and, under
    /// [`RemovalPolicy::LegacySplice`], the last team was evicted instead.
    Anomaly { evicted: TeamId },
}

fn list_name(raw: &str) -> Result<&str, PicklistError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PicklistError::EmptyName);
    }
    Ok(name)
}

fn not_found(name: &str) -> PicklistError {
    PicklistError::NotFound {
        name: name.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// PicklistStore
// ---------------------------------------------------------------------------

/// Owns one event's [`PicklistSet`] and every rule about how it may change.
///
/// Nothing here touches storage; [`crate::session::EventSession`] persists
/// after each successful call.
#[derive(Debug, Clone, Default)]
pub struct PicklistStore {
    pub(crate) set: PicklistSet,
    removal_policy: RemovalPolicy,
}

impl PicklistStore {
    pub fn new(set: PicklistSet, removal_policy: RemovalPolicy) -> Self {
        PicklistStore {
            set,
            removal_policy,
        }
    }

    pub fn set(&self) -> &PicklistSet {
        &self.set
    }

    pub fn removal_policy(&self) -> RemovalPolicy {
        self.removal_policy
    }

    /// Read-only projections over the current set.
    pub fn query(&self) -> PicklistQuery<'_> {
        PicklistQuery::new(&self.set)
    }

    /// Swap in a freshly loaded set.
    pub(crate) fn replace_set(&mut self, set: PicklistSet) {
        self.set = set;
    }

    /// Create an empty list called `name` at the end of the list order.
    pub fn create_list(&mut self, name: &str) -> Result<(), PicklistError> {
        let name = list_name(name)?;
        if self.set.contains(name) {
            return Err(PicklistError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.set.lists.push(Picklist::new(name));
        Ok(())
    }

    /// Insert `moving` directly after `after` in `list`.
    ///
    /// `moving` is first taken out of its old position, so this is a move
    /// when the team is already listed. `after == None`, or an `after` that
    /// is not in the list, inserts at the top. Passing the same team for
    /// both is a no-op.
    pub fn add_to(
        &mut self,
        list: &str,
        after: Option<&TeamId>,
        moving: &TeamId,
    ) -> Result<(), PicklistError> {
        let picklist = self.set.get_mut(list).ok_or_else(|| not_found(list))?;
        if after == Some(moving) {
            return Ok(());
        }

        let teams = picklist.teams_mut();
        if let Some(pos) = teams.iter().position(|t| t == moving) {
            teams.remove(pos);
        }
        let index = after
            .and_then(|a| teams.iter().position(|t| t == a))
            .map_or(0, |pos| pos + 1);
        teams.insert(index, moving.clone());
        Ok(())
    }

    /// Remove `team` from `list`, or delete the whole list when `team` is the
    /// empty sentinel (`None`). Confirming a whole-list delete is the
    /// caller's job.
    ///
    /// An emptied list stays in the set until the next load prunes it.
    pub fn remove_team(
        &mut self,
        list: &str,
        team: Option<&TeamId>,
    ) -> Result<Removal, PicklistError> {
        let Some(team) = team else {
            self.remove_list(list)?;
            return Ok(Removal::List);
        };

        let policy = self.removal_policy;
        let teams = self
            .set
            .get_mut(list)
            .ok_or_else(|| not_found(list))?
            .teams_mut();

        match teams.iter().position(|t| t == team) {
            Some(pos) => {
                teams.remove(pos);
                Ok(Removal::Team)
            }
            None => match policy {
                RemovalPolicy::Strict => Ok(Removal::Absent),
                RemovalPolicy::LegacySplice => Ok(teams
                    .pop()
                    .map_or(Removal::Absent, |evicted| Removal::Anomaly { evicted })),
            },
        }
    }

    /// Delete `name` and its contents unconditionally.
    pub fn remove_list(&mut self, name: &str) -> Result<Picklist, PicklistError> {
        let idx = self.set.index_of(name).ok_or_else(|| not_found(name))?;
        Ok(self.set.lists.remove(idx))
    }

    /// Move the list `old` to the key `new`, keeping its contents, order, and
    /// place among the other lists.
    ///
    /// Fails without touching anything when `new` already names a different
    /// list. Renaming a list to its own name succeeds and changes nothing.
    pub fn rename_list(&mut self, old: &str, new: &str) -> Result<(), PicklistError> {
        let old = list_name(old)?;
        let new = list_name(new)?;
        if old != new && self.set.contains(new) {
            return Err(PicklistError::DuplicateName {
                name: new.to_string(),
            });
        }
        let idx = self.set.index_of(old).ok_or_else(|| not_found(old))?;
        self.set.lists[idx].set_name(new);
        Ok(())
    }

    /// Bulk-load an ordering (typically a computed ranking) into `name`,
    /// creating the list or overwriting its contents. Duplicate teams keep
    /// their first position.
    pub fn save_list(
        &mut self,
        name: &str,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Result<(), PicklistError> {
        let name = list_name(name)?;
        match self.set.get_mut(name) {
            Some(existing) => existing.replace_teams(teams),
            None => self.set.lists.push(Picklist::with_teams(name, teams)),
        }
        Ok(())
    }

    /// Like [`save_list`](Self::save_list) but never overwrites: `+` is
    /// appended to `base_name` until the name is free. Returns the name used.
    pub fn save_as_new_list(
        &mut self,
        base_name: &str,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Result<String, PicklistError> {
        let mut name = list_name(base_name)?.to_string();
        while self.set.contains(&name) {
            name.push('+');
        }
        self.set.lists.push(Picklist::with_teams(&name, teams));
        Ok(name)
    }
}
