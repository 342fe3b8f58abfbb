// Event session: the context object that owns one event's picklists.
//
// Every mutation runs to completion as validate → mutate → persist → notify
// before control returns. A mutation that leaves the set unchanged is neither
// persisted nor published; one whose save fails is rolled back. The session is a plain owned value; hosts that
// share it across threads must put it behind a single lock or keep it on one
// task.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::persist::{BlobStore, PicklistPersistence};
use crate::picklist::{Picklist, PicklistSet, Pruned};
use crate::query::PicklistQuery;
use crate::store::{PicklistError, PicklistStore, Removal, RemovalPolicy};
use crate::team::TeamId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Picklist(#[from] PicklistError),

    #[error("failed to persist picklists for event {event_id}")]
    Persist {
        event_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    /// The validation failure behind this error, if it is one.
    pub fn as_picklist_error(&self) -> Option<&PicklistError> {
        match self {
            SessionError::Picklist(e) => Some(e),
            SessionError::Persist { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Published to subscribers after each persisted mutation that changed the
/// set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PicklistChange {
    /// The set was (re)loaded from storage; `pruned` lists were dropped.
    Loaded { pruned: Vec<String> },
    ListCreated { name: String },
    /// Contents or order of `name` changed.
    ListUpdated { name: String },
    ListRemoved { name: String },
    ListRenamed { from: String, to: String },
    CrossOutToggled { team: TeamId, crossed_out: bool },
}

/// How a click in a multi-list view should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkMode {
    /// Place the current team after the clicked one.
    Add,
    /// Toggle the clicked team's cross-out.
    Strike,
    /// Take the clicked team out of the list.
    Remove,
}

/// Outcome of [`EventSession::mark`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marked {
    Added,
    Struck { crossed_out: bool },
    Removed(Removal),
    /// Strike with no clicked team; nothing to do.
    Ignored,
}

// ---------------------------------------------------------------------------
// EventSession
// ---------------------------------------------------------------------------

pub struct EventSession<B: BlobStore> {
    event_id: String,
    store: PicklistStore,
    persistence: PicklistPersistence<B>,
    subscribers: Vec<mpsc::UnboundedSender<PicklistChange>>,
}

impl<B: BlobStore> EventSession<B> {
    /// Load the picklists for `event_id` (pruning empty lists) and take
    /// ownership of them.
    pub fn open(
        event_id: &str,
        persistence: PicklistPersistence<B>,
        removal_policy: RemovalPolicy,
    ) -> Result<Self, SessionError> {
        let (set, pruned) = persistence
            .load(event_id)
            .map_err(|source| SessionError::Persist {
                event_id: event_id.to_string(),
                source,
            })?;
        info!(
            "Opened event {} with {} list(s), {} pruned",
            event_id,
            set.lists().len(),
            pruned.lists.len()
        );
        Ok(EventSession {
            event_id: event_id.to_string(),
            store: PicklistStore::new(set, removal_policy),
            persistence,
            subscribers: Vec::new(),
        })
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn store(&self) -> &PicklistStore {
        &self.store
    }

    pub fn persistence(&self) -> &PicklistPersistence<B> {
        &self.persistence
    }

    pub fn query(&self) -> PicklistQuery<'_> {
        self.store.query()
    }

    pub fn is_crossed_out(&self, team: &TeamId) -> bool {
        self.store.is_crossed_out(team)
    }

    /// Receive a [`PicklistChange`] after every successful mutation. Dropping
    /// the receiver unsubscribes.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PicklistChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Re-read the stored set, as a new session would, pruning empty lists.
    pub fn reload(&mut self) -> Result<Pruned, SessionError> {
        let (set, pruned) = self
            .persistence
            .load(&self.event_id)
            .map_err(|source| self.persist_error(source))?;
        self.store.replace_set(set);
        self.notify(PicklistChange::Loaded {
            pruned: pruned.lists.clone(),
        });
        Ok(pruned)
    }

    pub fn create_list(&mut self, name: &str) -> Result<(), SessionError> {
        let before = self.store.set().clone();
        self.store.create_list(name)?;
        self.commit(before, PicklistChange::ListCreated {
            name: name.trim().to_string(),
        })
    }

    pub fn add_to(
        &mut self,
        list: &str,
        after: Option<&TeamId>,
        moving: &TeamId,
    ) -> Result<(), SessionError> {
        let before = self.store.set().clone();
        self.store.add_to(list, after, moving)?;
        self.commit(before, PicklistChange::ListUpdated {
            name: list.trim().to_string(),
        })
    }

    pub fn remove_team(
        &mut self,
        list: &str,
        team: Option<&TeamId>,
    ) -> Result<Removal, SessionError> {
        let before = self.store.set().clone();
        let removal = self.store.remove_team(list, team)?;
        let name = list.trim().to_string();
        let change = match &removal {
            Removal::List => PicklistChange::ListRemoved { name },
            Removal::Anomaly { evicted } => {
                warn!(
                    "Removing absent team {:?} from {:?} evicted {} (legacy splice)",
                    team.map(TeamId::as_str),
                    name,
                    evicted
                );
                PicklistChange::ListUpdated { name }
            }
            Removal::Team | Removal::Absent => PicklistChange::ListUpdated { name },
        };
        self.commit(before, change)?;
        Ok(removal)
    }

    pub fn remove_list(&mut self, name: &str) -> Result<Picklist, SessionError> {
        let before = self.store.set().clone();
        let removed = self.store.remove_list(name)?;
        self.commit(before, PicklistChange::ListRemoved {
            name: removed.name().to_string(),
        })?;
        Ok(removed)
    }

    pub fn rename_list(&mut self, old: &str, new: &str) -> Result<(), SessionError> {
        let before = self.store.set().clone();
        self.store.rename_list(old, new)?;
        self.commit(before, PicklistChange::ListRenamed {
            from: old.trim().to_string(),
            to: new.trim().to_string(),
        })
    }

    /// Toggle `team`'s cross-out. Returns the new state.
    pub fn cross_out(&mut self, team: &TeamId) -> Result<bool, SessionError> {
        let before = self.store.set().clone();
        let crossed_out = self.store.cross_out(team);
        self.commit(before, PicklistChange::CrossOutToggled {
            team: team.clone(),
            crossed_out,
        })?;
        Ok(crossed_out)
    }

    /// Materialize a computed ordering as list `name`, creating or
    /// overwriting it.
    pub fn save_list(
        &mut self,
        name: &str,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Result<(), SessionError> {
        let before = self.store.set().clone();
        let created = !before.contains(name);
        self.store.save_list(name, teams)?;
        let name = name.trim().to_string();
        self.commit(before, if created {
            PicklistChange::ListCreated { name }
        } else {
            PicklistChange::ListUpdated { name }
        })
    }

    /// Materialize a computed ordering under a fresh name derived from
    /// `base_name`. Returns the name used.
    pub fn save_as_new_list(
        &mut self,
        base_name: &str,
        teams: impl IntoIterator<Item = TeamId>,
    ) -> Result<String, SessionError> {
        let before = self.store.set().clone();
        let name = self.store.save_as_new_list(base_name, teams)?;
        self.commit(before, PicklistChange::ListCreated { name: name.clone() })?;
        Ok(name)
    }

    /// Apply a click on `clicked` in `list` according to `mode`. `current`
    /// is the team the user is working with (the one being placed in
    /// [`MarkMode::Add`]). A `None` click means the list header.
    pub fn mark(
        &mut self,
        mode: MarkMode,
        list: &str,
        clicked: Option<&TeamId>,
        current: &TeamId,
    ) -> Result<Marked, SessionError> {
        match mode {
            MarkMode::Add => {
                self.add_to(list, clicked, current)?;
                Ok(Marked::Added)
            }
            MarkMode::Strike => match clicked {
                Some(team) => Ok(Marked::Struck {
                    crossed_out: self.cross_out(team)?,
                }),
                None => Ok(Marked::Ignored),
            },
            MarkMode::Remove => Ok(Marked::Removed(self.remove_team(list, clicked)?)),
        }
    }

    /// Persist the mutated set and publish `change`. `before` is the set as
    /// it was ahead of the mutation; it is restored if the save fails.
    fn commit(&mut self, before: PicklistSet, change: PicklistChange) -> Result<(), SessionError> {
        if *self.store.set() == before {
            debug!("{:?} left event {} unchanged", change, self.event_id);
            return Ok(());
        }
        if let Err(source) = self.persistence.save(&self.event_id, self.store.set()) {
            warn!("Save failed for event {}, rolling back {:?}", self.event_id, change);
            self.store.replace_set(before);
            return Err(self.persist_error(source));
        }
        debug!("Committed {:?} for event {}", change, self.event_id);
        self.notify(change);
        Ok(())
    }

    fn notify(&mut self, change: PicklistChange) {
        self.subscribers
            .retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn persist_error(&self, source: anyhow::Error) -> SessionError {
        SessionError::Persist {
            event_id: self.event_id.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::persist::MemoryBlobStore;

    const EVENT: &str = "2025mndu";

    fn t(raw: &str) -> TeamId {
        TeamId::parse(raw).unwrap()
    }

    fn open_shared(backend: &Arc<MemoryBlobStore>) -> EventSession<Arc<MemoryBlobStore>> {
        EventSession::open(
            EVENT,
            PicklistPersistence::new(Arc::clone(backend)),
            RemovalPolicy::Strict,
        )
        .unwrap()
    }

    fn members(session: &EventSession<Arc<MemoryBlobStore>>, list: &str) -> Vec<String> {
        session
            .query()
            .members(list)
            .iter()
            .map(|t| t.to_string())
            .collect()
    }

    /// Storage that always fails, to check errors propagate.
    struct BrokenStore;

    impl BlobStore for BrokenStore {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        fn put(&self, _key: &str, _blob: &str) -> anyhow::Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    /// Memory storage that counts writes and can be told to fail them.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryBlobStore,
        puts: AtomicUsize,
        failing: AtomicBool,
    }

    impl BlobStore for FlakyStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn put(&self, key: &str, blob: &str) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, blob)
        }
    }

    fn open_flaky(backend: &Arc<FlakyStore>) -> EventSession<Arc<FlakyStore>> {
        EventSession::open(
            EVENT,
            PicklistPersistence::new(Arc::clone(backend)),
            RemovalPolicy::Strict,
        )
        .unwrap()
    }

    #[test]
    fn every_mutation_is_persisted_immediately() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);

        session.create_list("Finalists").unwrap();
        session.add_to("Finalists", None, &t("254")).unwrap();
        session.cross_out(&t("254")).unwrap();

        let reopened = open_shared(&backend);
        assert_eq!(members(&reopened, "Finalists"), vec!["254"]);
        assert!(reopened.is_crossed_out(&t("254")));
    }

    #[test]
    fn failed_validation_does_not_persist_or_notify() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        let mut changes = session.subscribe();

        let err = session.add_to("Missing", None, &t("1")).unwrap_err();

        assert!(matches!(
            err.as_picklist_error(),
            Some(PicklistError::NotFound { .. })
        ));
        assert!(backend.is_empty());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn emptied_list_survives_until_next_load() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        session.save_list("A", vec![t("1")]).unwrap();

        session.remove_team("A", Some(&t("1"))).unwrap();
        assert_eq!(session.query().list_names(), vec!["A"]);

        let pruned = session.reload().unwrap();
        assert_eq!(pruned.lists, vec!["A".to_string()]);
        assert!(session.query().list_names().is_empty());

        let reopened = open_shared(&backend);
        assert!(reopened.query().list_names().is_empty());
    }

    #[test]
    fn open_prunes_empty_lists() {
        let backend = Arc::new(MemoryBlobStore::new());
        {
            let mut session = open_shared(&backend);
            session.create_list("Empty").unwrap();
            session.save_list("Full", vec![t("7")]).unwrap();
        }

        let session = open_shared(&backend);

        assert_eq!(session.query().list_names(), vec!["Full"]);
    }

    #[test]
    fn subscribers_see_changes_in_order() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        let mut changes = session.subscribe();

        session.create_list("A").unwrap();
        session.add_to("A", None, &t("1")).unwrap();
        session.rename_list("A", "B").unwrap();
        session.cross_out(&t("1")).unwrap();
        session.remove_team("B", None).unwrap();

        let mut seen = Vec::new();
        while let Ok(change) = changes.try_recv() {
            seen.push(change);
        }
        assert_eq!(
            seen,
            vec![
                PicklistChange::ListCreated { name: "A".into() },
                PicklistChange::ListUpdated { name: "A".into() },
                PicklistChange::ListRenamed {
                    from: "A".into(),
                    to: "B".into()
                },
                PicklistChange::CrossOutToggled {
                    team: t("1"),
                    crossed_out: true
                },
                PicklistChange::ListRemoved { name: "B".into() },
            ]
        );
    }

    #[test]
    fn dropped_subscribers_are_forgotten() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        let dropped = session.subscribe();
        let mut kept = session.subscribe();
        drop(dropped);

        session.create_list("A").unwrap();

        assert_eq!(session.subscribers.len(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn persistence_failure_is_reported() {
        let mut session = EventSession::open(
            EVENT,
            PicklistPersistence::new(BrokenStore),
            RemovalPolicy::Strict,
        )
        .unwrap();

        let err = session.create_list("A").unwrap_err();

        assert!(matches!(err, SessionError::Persist { ref event_id, .. } if event_id == EVENT));
        assert!(err.as_picklist_error().is_none());

        // The failed create left nothing behind, so a retry fails the same way.
        assert!(session.query().list_names().is_empty());
        let retry = session.create_list("A").unwrap_err();
        assert!(matches!(retry, SessionError::Persist { .. }));
    }

    #[test]
    fn failed_save_rolls_back_and_does_not_notify() {
        let backend = Arc::new(FlakyStore::default());
        let mut session = open_flaky(&backend);
        session.save_list("L", vec![t("1"), t("2")]).unwrap();
        let mut changes = session.subscribe();
        backend.failing.store(true, Ordering::SeqCst);

        assert!(session.add_to("L", None, &t("2")).is_err());
        assert!(session.cross_out(&t("1")).is_err());
        assert!(session.rename_list("L", "M").is_err());

        assert_eq!(session.query().list_names(), vec!["L"]);
        assert_eq!(session.query().members("L"), &[t("1"), t("2")]);
        assert!(!session.is_crossed_out(&t("1")));
        assert!(changes.try_recv().is_err());

        // Once storage recovers the same edit goes through.
        backend.failing.store(false, Ordering::SeqCst);
        session.rename_list("L", "M").unwrap();
        assert_eq!(open_flaky(&backend).query().list_names(), vec!["M"]);
    }

    #[test]
    fn strict_removal_of_absent_team_is_not_persisted() {
        let backend = Arc::new(FlakyStore::default());
        let mut session = open_flaky(&backend);
        session.save_list("L", vec![t("1")]).unwrap();
        let mut changes = session.subscribe();
        let puts = backend.puts.load(Ordering::SeqCst);

        let removal = session.remove_team("L", Some(&t("404"))).unwrap();

        assert_eq!(removal, Removal::Absent);
        assert_eq!(backend.puts.load(Ordering::SeqCst), puts);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn mark_dispatches_by_mode() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        session.save_list("L", vec![t("1"), t("2")]).unwrap();

        let added = session
            .mark(MarkMode::Add, "L", Some(&t("1")), &t("9"))
            .unwrap();
        assert_eq!(added, Marked::Added);
        assert_eq!(members(&session, "L"), vec!["1", "9", "2"]);

        let struck = session
            .mark(MarkMode::Strike, "L", Some(&t("2")), &t("9"))
            .unwrap();
        assert_eq!(struck, Marked::Struck { crossed_out: true });
        assert!(session.is_crossed_out(&t("2")));

        let removed = session
            .mark(MarkMode::Remove, "L", Some(&t("1")), &t("9"))
            .unwrap();
        assert_eq!(removed, Marked::Removed(Removal::Team));
        assert_eq!(members(&session, "L"), vec!["9", "2"]);

        let ignored = session.mark(MarkMode::Strike, "L", None, &t("9")).unwrap();
        assert_eq!(ignored, Marked::Ignored);
    }

    #[test]
    fn save_list_reports_created_then_updated() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        let mut changes = session.subscribe();

        session.save_list("Rank", vec![t("1")]).unwrap();
        session.save_list("Rank", vec![t("2")]).unwrap();

        assert_eq!(
            changes.try_recv().unwrap(),
            PicklistChange::ListCreated { name: "Rank".into() }
        );
        assert_eq!(
            changes.try_recv().unwrap(),
            PicklistChange::ListUpdated { name: "Rank".into() }
        );
    }

    #[test]
    fn legacy_policy_flows_through_session() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = EventSession::open(
            EVENT,
            PicklistPersistence::new(Arc::clone(&backend)),
            RemovalPolicy::LegacySplice,
        )
        .unwrap();
        session.save_list("L", vec![t("1"), t("2")]).unwrap();

        let removal = session.remove_team("L", Some(&t("404"))).unwrap();

        assert_eq!(removal, Removal::Anomaly { evicted: t("2") });
        assert_eq!(members(&session, "L"), vec!["1"]);
    }

    #[test]
    fn cross_out_visible_from_every_list() {
        let backend = Arc::new(MemoryBlobStore::new());
        let mut session = open_shared(&backend);
        session.save_list("A", vec![t("111")]).unwrap();
        session.save_list("B", vec![t("111")]).unwrap();

        session.mark(MarkMode::Strike, "A", Some(&t("111")), &t("1")).unwrap();

        assert_eq!(session.query().lists_containing(&t("111")), vec!["A", "B"]);
        assert!(session.query().is_crossed_out(&t("111")));
    }
}
