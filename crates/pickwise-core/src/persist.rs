// Per-event persistence of the whole picklist set as one JSON blob.
//
// Layout written:
//
//     {"lists": {"Finalists": ["33", "254"], ...}, "crossedOut": ["254"]}
//
// `crossedOut` is omitted until the first cross-out. Older clients stored a
// flat `{"<list>": [...], "picked": [...]}` object with numeric team ids;
// that layout is still accepted on read and rewritten on the next save.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::crossout::CrossOutSet;
use crate::picklist::{Picklist, PicklistSet, Pruned};
use crate::team::TeamId;

/// Prefix of the durable key; one key per event.
pub const KEY_PREFIX: &str = "picklists:";

/// List name that held the cross-out set in the flat legacy layout.
const LEGACY_CROSS_OUT_KEY: &str = "picked";

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// A durable key-value store holding one string blob per key. Writes to a
/// single key are assumed atomic.
pub trait BlobStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, blob: &str) -> Result<()>;
}

impl<B: BlobStore + ?Sized> BlobStore for Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, blob: &str) -> Result<()> {
        (**self).put(key, blob)
    }
}

/// Process-local blob store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.blobs.lock().expect("blob store mutex poisoned")
    }

    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.blobs().get(key).cloned())
    }

    fn put(&self, key: &str, blob: &str) -> Result<()> {
        self.blobs().insert(key.to_string(), blob.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PicklistPersistence
// ---------------------------------------------------------------------------

/// Loads and saves whole picklist sets, one blob per event.
#[derive(Debug)]
pub struct PicklistPersistence<B> {
    backend: B,
}

impl<B: BlobStore> PicklistPersistence<B> {
    pub fn new(backend: B) -> Self {
        PicklistPersistence { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn storage_key(event_id: &str) -> String {
        format!("{KEY_PREFIX}{event_id}")
    }

    /// Read the set for `event_id`, then prune zero-length lists (and an
    /// empty cross-out set). An event with nothing stored yields an empty
    /// set. When pruning or repairing changed anything the result is written
    /// back.
    ///
    /// This is the only place empty lists disappear. Non-empty lists always
    /// survive; a blank or colliding stored name is renamed instead.
    pub fn load(&self, event_id: &str) -> Result<(PicklistSet, Pruned)> {
        let key = Self::storage_key(event_id);
        let Some(blob) = self
            .backend
            .get(&key)
            .with_context(|| format!("failed to read picklists for event {event_id}"))?
        else {
            debug!("No picklists stored for event {}", event_id);
            return Ok((PicklistSet::new(), Pruned::default()));
        };

        let (mut set, mut pruned) = decode_with_repairs(&blob)
            .with_context(|| format!("failed to decode picklists for event {event_id}"))?;
        let empties = set.prune_empty();
        pruned.lists.extend(empties.lists);
        pruned.cross_out = empties.cross_out;
        if !pruned.is_empty() {
            info!(
                "Pruned {} empty list(s), renamed {}, skipped {} bad team entries for event {}{}",
                pruned.lists.len(),
                pruned.renamed.len(),
                pruned.skipped_teams,
                event_id,
                if pruned.cross_out { " and an empty cross-out set" } else { "" }
            );
            self.save(event_id, &set)?;
        }
        Ok((set, pruned))
    }

    /// Replace the stored set for `event_id` with `set`.
    pub fn save(&self, event_id: &str, set: &PicklistSet) -> Result<()> {
        let blob = encode(set)?;
        self.backend
            .put(&Self::storage_key(event_id), &blob)
            .with_context(|| format!("failed to write picklists for event {event_id}"))?;
        debug!(
            "Saved {} list(s) for event {} ({} bytes)",
            set.lists().len(),
            event_id,
            blob.len()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Serialize a set to the blob layout. Key order follows list order.
pub fn encode(set: &PicklistSet) -> Result<String> {
    serde_json::to_string(set).context("failed to serialize picklists")
}

/// Parse a blob in either the current or the legacy flat layout.
pub fn decode(blob: &str) -> Result<PicklistSet> {
    decode_with_repairs(blob).map(|(set, _)| set)
}

/// Like [`decode`], also reporting the renames and skipped team entries
/// needed to fit the blob into a valid set. `lists`/`cross_out` are left
/// for the prune.
fn decode_with_repairs(blob: &str) -> Result<(PicklistSet, Pruned)> {
    let stored: StoredBlob = serde_json::from_str(blob).context("failed to parse picklist blob")?;
    let mut repairs = Pruned::default();
    let set = match stored {
        StoredBlob::Current { lists, crossed_out } => {
            let crossed_out = crossed_out.map(|teams| cross_out_set(teams, &mut repairs));
            PicklistSet::from_parts(build_lists(lists.0, &mut repairs), crossed_out)
        }
        StoredBlob::Legacy(entries) => {
            let mut crossed_out = None;
            let mut lists = Vec::with_capacity(entries.0.len());
            for (name, teams) in entries.0 {
                if name == LEGACY_CROSS_OUT_KEY {
                    crossed_out = Some(cross_out_set(teams, &mut repairs));
                } else {
                    lists.push((name, teams));
                }
            }
            PicklistSet::from_parts(build_lists(lists, &mut repairs), crossed_out)
        }
    };
    Ok((set, repairs))
}

struct ListsMap<'a>(&'a [Picklist]);

impl Serialize for ListsMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for list in self.0 {
            map.serialize_entry(list.name(), list.teams())?;
        }
        map.end()
    }
}

impl Serialize for PicklistSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = if self.crossed_out.is_some() { 2 } else { 1 };
        let mut state = serializer.serialize_struct("PicklistSet", fields)?;
        state.serialize_field("lists", &ListsMap(&self.lists))?;
        if let Some(crossed) = &self.crossed_out {
            state.serialize_field("crossedOut", crossed)?;
        }
        state.end()
    }
}

/// Map entries in document order. Deserializing straight into this (never
/// through `serde_json::Value`) is what keeps list order intact.
struct OrderedLists(Vec<(String, StoredTeams)>);

impl<'de> Deserialize<'de> for OrderedLists {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedListsVisitor)
    }
}

struct OrderedListsVisitor;

impl<'de> Visitor<'de> for OrderedListsVisitor {
    type Value = OrderedLists;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of list names to team arrays")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<OrderedLists, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((name, teams)) = map.next_entry::<String, StoredTeams>()? {
            entries.push((name, teams));
        }
        Ok(OrderedLists(entries))
    }
}

/// A stored team array. Entries that are not a team id are counted and
/// dropped rather than failing the whole blob.
struct StoredTeams {
    teams: Vec<TeamId>,
    skipped: usize,
}

impl<'de> Deserialize<'de> for StoredTeams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StoredTeamsVisitor)
    }
}

struct StoredTeamsVisitor;

impl<'de> Visitor<'de> for StoredTeamsVisitor {
    type Value = StoredTeams;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of team ids")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<StoredTeams, A::Error> {
        let mut stored = StoredTeams {
            teams: Vec::with_capacity(seq.size_hint().unwrap_or(0)),
            skipped: 0,
        };
        while let Some(StoredTeam(entry)) = seq.next_element()? {
            match entry {
                Some(team) => stored.teams.push(team),
                None => stored.skipped += 1,
            }
        }
        Ok(stored)
    }

    fn visit_unit<E: de::Error>(self) -> Result<StoredTeams, E> {
        Ok(StoredTeams {
            teams: Vec::new(),
            skipped: 0,
        })
    }
}

/// One stored team entry; `None` when it is not a usable team id.
struct StoredTeam(Option<TeamId>);

impl<'de> Deserialize<'de> for StoredTeam {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StoredTeamVisitor)
    }
}

struct StoredTeamVisitor;

impl<'de> Visitor<'de> for StoredTeamVisitor {
    type Value = StoredTeam;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a team id")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<StoredTeam, E> {
        Ok(StoredTeam(TeamId::parse(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<StoredTeam, E> {
        Ok(StoredTeam(TeamId::parse(&v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<StoredTeam, E> {
        if v < 0 {
            return Ok(StoredTeam(None));
        }
        Ok(StoredTeam(TeamId::parse(&v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<StoredTeam, E> {
        Ok(StoredTeam(None))
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<StoredTeam, E> {
        Ok(StoredTeam(None))
    }

    fn visit_unit<E: de::Error>(self) -> Result<StoredTeam, E> {
        Ok(StoredTeam(None))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<StoredTeam, A::Error> {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(StoredTeam(None))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<StoredTeam, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(StoredTeam(None))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBlob {
    Current {
        lists: OrderedLists,
        #[serde(rename = "crossedOut", default)]
        crossed_out: Option<StoredTeams>,
    },
    Legacy(OrderedLists),
}

/// Name given to a non-empty stored list whose name was blank.
const UNNAMED_LIST: &str = "Unnamed";

fn cross_out_set(stored: StoredTeams, repairs: &mut Pruned) -> CrossOutSet {
    repairs.skipped_teams += stored.skipped;
    CrossOutSet::from_teams(stored.teams)
}

/// Normalize stored entries: names are trimmed and each list is
/// deduplicated. A non-empty list whose name is blank, or repeats an earlier
/// name once trimmed, gets `+` appended until the name is free. Empty lists
/// in that position are dropped and reported, as the prune would.
fn build_lists(entries: Vec<(String, StoredTeams)>, repairs: &mut Pruned) -> Vec<Picklist> {
    let mut lists: Vec<Picklist> = Vec::with_capacity(entries.len());
    for (raw_name, stored) in entries {
        repairs.skipped_teams += stored.skipped;
        let trimmed = raw_name.trim();
        if !trimmed.is_empty() && !name_taken(&lists, trimmed) {
            lists.push(Picklist::with_teams(trimmed, stored.teams));
            continue;
        }
        if stored.teams.is_empty() {
            repairs.lists.push(raw_name);
            continue;
        }

        let mut name = if trimmed.is_empty() { UNNAMED_LIST } else { trimmed }.to_string();
        while name_taken(&lists, &name) {
            name.push('+');
        }
        warn!("Stored list {:?} renamed to {:?} on load", raw_name, name);
        lists.push(Picklist::with_teams(&name, stored.teams));
        repairs.renamed.push((raw_name, name));
    }
    lists
}

fn name_taken(lists: &[Picklist], name: &str) -> bool {
    lists.iter().any(|l| l.name() == name)
}
