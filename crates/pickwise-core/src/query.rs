// Read-only projections over a picklist set, for views that filter or
// highlight by picklist membership.

use crate::picklist::PicklistSet;
use crate::team::TeamId;

/// A borrowed, read-only view of one event's picklists.
#[derive(Debug, Clone, Copy)]
pub struct PicklistQuery<'a> {
    set: &'a PicklistSet,
}

impl<'a> PicklistQuery<'a> {
    pub fn new(set: &'a PicklistSet) -> Self {
        PicklistQuery { set }
    }

    /// List names in insertion order. The cross-out set is never included.
    pub fn list_names(&self) -> Vec<&'a str> {
        self.set.lists().iter().map(|l| l.name()).collect()
    }

    /// Teams of `list` in order, or an empty slice if the list is absent.
    pub fn members(&self, list: &str) -> &'a [TeamId] {
        self.set.get(list).map(|l| l.teams()).unwrap_or(&[])
    }

    /// Names of every list that contains `team`, in list order.
    pub fn lists_containing(&self, team: &TeamId) -> Vec<&'a str> {
        self.set
            .lists()
            .iter()
            .filter(|l| l.contains(team))
            .map(|l| l.name())
            .collect()
    }

    pub fn is_crossed_out(&self, team: &TeamId) -> bool {
        self.set
            .crossed_out()
            .is_some_and(|crossed| crossed.contains(team))
    }

    /// Owned snapshot of the whole set, for persistence and bulk export.
    pub fn all(&self) -> PicklistSet {
        self.set.clone()
    }

    /// `(name, team count)` for every list, in list order.
    pub fn team_counts(&self) -> Vec<(&'a str, usize)> {
        self.set
            .lists()
            .iter()
            .map(|l| (l.name(), l.len()))
            .collect()
    }

    /// Zero-based rank of `team` within `list`.
    pub fn position_of(&self, list: &str, team: &TeamId) -> Option<usize> {
        self.set.get(list).and_then(|l| l.position(team))
    }

    /// Members of `list` that are not crossed out, in list order.
    pub fn available_members(&self, list: &str) -> Vec<&'a TeamId> {
        self.members(list)
            .iter()
            .filter(|team| !self.is_crossed_out(team))
            .collect()
    }

    /// Order `teams` by their rank in `list`. Teams missing from the list go
    /// last and keep their relative order.
    pub fn sort_by_list(&self, list: &str, teams: &mut [TeamId]) {
        let ranking = self.members(list);
        teams.sort_by_key(|team| {
            ranking
                .iter()
                .position(|t| t == team)
                .unwrap_or(ranking.len())
        });
    }
}
