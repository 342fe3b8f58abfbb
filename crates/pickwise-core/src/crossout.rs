// Event-wide "already spoken for" marker, independent of list membership.

use serde::{Deserialize, Serialize};

use crate::store::PicklistStore;
use crate::team::TeamId;

/// Teams crossed out for the whole event, in the order they were struck.
///
/// Obeys the same uniqueness rule as a picklist: toggling a team that is
/// already present removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrossOutSet(Vec<TeamId>);

impl CrossOutSet {
    pub(crate) fn from_teams(teams: impl IntoIterator<Item = TeamId>) -> Self {
        let mut set = CrossOutSet::default();
        for team in teams {
            if !set.contains(&team) {
                set.0.push(team);
            }
        }
        set
    }

    /// Flip membership of `team`. Returns the new crossed-out state.
    pub(crate) fn toggle(&mut self, team: &TeamId) -> bool {
        match self.0.iter().position(|t| t == team) {
            Some(pos) => {
                self.0.remove(pos);
                false
            }
            None => {
                self.0.push(team.clone());
                true
            }
        }
    }

    pub fn contains(&self, team: &TeamId) -> bool {
        self.0.contains(team)
    }

    pub fn teams(&self) -> &[TeamId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PicklistStore {
    /// Toggle `team` in the cross-out set, creating the set on first use.
    /// Returns whether the team is crossed out afterwards.
    ///
    /// Not scoped to any list: a team struck while one list is on screen
    /// shows as struck in every other list too.
    pub fn cross_out(&mut self, team: &TeamId) -> bool {
        self.set
            .crossed_out
            .get_or_insert_with(CrossOutSet::default)
            .toggle(team)
    }

    pub fn is_crossed_out(&self, team: &TeamId) -> bool {
        self.set
            .crossed_out
            .as_ref()
            .is_some_and(|crossed| crossed.contains(team))
    }

    /// Crossed-out teams in the order they were struck.
    pub fn crossed_out(&self) -> &[TeamId] {
        self.set
            .crossed_out
            .as_ref()
            .map(|crossed| crossed.teams())
            .unwrap_or(&[])
    }
}
