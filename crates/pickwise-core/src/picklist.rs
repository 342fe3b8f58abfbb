// Picklist data model: named, ordered, duplicate-free team sequences.

use crate::crossout::CrossOutSet;
use crate::team::TeamId;

/// One named shortlist. A team occurs at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picklist {
    name: String,
    teams: Vec<TeamId>,
}

impl Picklist {
    pub(crate) fn new(name: &str) -> Self {
        Picklist {
            name: name.to_string(),
            teams: Vec::new(),
        }
    }

    /// Build a list from an arbitrary team sequence. Later repeats of a team
    /// are dropped so the first occurrence keeps its rank.
    pub(crate) fn with_teams(name: &str, teams: impl IntoIterator<Item = TeamId>) -> Self {
        let mut list = Picklist::new(name);
        list.replace_teams(teams);
        list
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn teams(&self) -> &[TeamId] {
        &self.teams
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn contains(&self, team: &TeamId) -> bool {
        self.teams.contains(team)
    }

    pub fn position(&self, team: &TeamId) -> Option<usize> {
        self.teams.iter().position(|t| t == team)
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn teams_mut(&mut self) -> &mut Vec<TeamId> {
        &mut self.teams
    }

    pub(crate) fn replace_teams(&mut self, teams: impl IntoIterator<Item = TeamId>) {
        self.teams.clear();
        for team in teams {
            if !self.teams.contains(&team) {
                self.teams.push(team);
            }
        }
    }
}

/// What loading changed in the stored set: pruned empties plus repairs of
/// entries older clients could write but the store cannot hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pruned {
    /// Names of the zero-length lists that were dropped, in list order.
    pub lists: Vec<String>,
    /// Whether an empty cross-out set was dropped.
    pub cross_out: bool,
    /// `(stored name, new name)` for non-empty lists whose name was blank or
    /// collided with an earlier list once trimmed.
    pub renamed: Vec<(String, String)>,
    /// Team entries that were not a team id (blank strings, nulls, ...).
    pub skipped_teams: usize,
}

impl Pruned {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
            && !self.cross_out
            && self.renamed.is_empty()
            && self.skipped_teams == 0
    }
}

/// Every picklist of one event plus its cross-out set.
///
/// Lists keep insertion order; that order is what `list_names()` reports and
/// what the persisted blob preserves. The cross-out set lives in its own
/// field so a user list literally named `picked` is just another list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PicklistSet {
    pub(crate) lists: Vec<Picklist>,
    pub(crate) crossed_out: Option<CrossOutSet>,
}

impl PicklistSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(lists: Vec<Picklist>, crossed_out: Option<CrossOutSet>) -> Self {
        PicklistSet { lists, crossed_out }
    }

    pub fn lists(&self) -> &[Picklist] {
        &self.lists
    }

    /// The cross-out set, or `None` if no team was ever crossed out (or the
    /// empty set was pruned at load).
    pub fn crossed_out(&self) -> Option<&CrossOutSet> {
        self.crossed_out.as_ref()
    }

    pub fn get(&self, name: &str) -> Option<&Picklist> {
        let name = name.trim();
        self.lists.iter().find(|l| l.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True when there are no lists and no cross-out set.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.crossed_out.is_none()
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.lists.iter().position(|l| l.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Picklist> {
        let name = name.trim();
        self.lists.iter_mut().find(|l| l.name == name)
    }

    /// Drop every zero-length list and an empty cross-out set.
    ///
    /// Only the load path calls this. Interactive removals leave emptied
    /// lists in place until the next load.
    pub(crate) fn prune_empty(&mut self) -> Pruned {
        let mut pruned = Pruned::default();
        self.lists.retain(|list| {
            if list.is_empty() {
                pruned.lists.push(list.name.clone());
                false
            } else {
                true
            }
        });
        if self.crossed_out.as_ref().is_some_and(CrossOutSet::is_empty) {
            self.crossed_out = None;
            pruned.cross_out = true;
        }
        pruned
    }
}
