// -*- coding: utf-8 -*-
// ------------------------------------------------------------------------------------------------
// Copyright © 2019, CEP authors.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License.  You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the
// License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either
// express or implied.  See the License for the specific language governing permissions and
// limitations under the License.
// ------------------------------------------------------------------------------------------------

//! Defines the shared buffer: an arena-backed DAG that stores every consumed event once, while
//! all live match branches share it through versioned predecessor edges.
//!
//! When `n` competing branches share a prefix of taken events, the prefix costs its own length in
//! storage, not `n` times that.  Edges only ever point backwards in time, so the graph cannot
//! form cycles, and an arena of integer ids is all the indirection we need.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::dewey::DeweyNumber;
use crate::event::EventWrapper;
use crate::event::Timestamp;

/// One extracted match: the ordered events taken at each stage, keyed by stage name.  Stages that
/// never took an event are absent from the map.
pub type PatternMatch<V> = BTreeMap<String, Vec<V>>;

/// Identifies one entry in the buffer arena.  An id is only meaningful together with the buffer
/// that issued it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct EntryId(usize);

/// An edge to the entry taken just before this one, labelled with the version of the branch that
/// wrote it.  A root entry (the first take of its branch) records no predecessor.
#[derive(Clone, Debug, Eq, PartialEq)]
struct BufferEdge {
    predecessor: Option<EntryId>,
    version: DeweyNumber,
}

struct BufferEntry<V> {
    stage: Rc<str>,
    event: EventWrapper<V>,
    arrival: u64,
    edges: SmallVec<[BufferEdge; 2]>,
    refs: usize,
}

/// The buffer itself.  Entries are created by [`put`], anchored by [`retain`]/[`release`] (one
/// reference per branch that points at them, plus one per successor edge), and read back by
/// [`extract_patches`].
///
/// [`put`]: #method.put
/// [`retain`]: #method.retain
/// [`release`]: #method.release
/// [`extract_patches`]: #method.extract_patches
pub struct SharedBuffer<V> {
    slots: Vec<Option<BufferEntry<V>>>,
    free: Vec<usize>,
    index: HashMap<(Rc<str>, u64), EntryId>,
    live: usize,
}

impl<V> SharedBuffer<V> {
    pub fn new() -> SharedBuffer<V> {
        SharedBuffer {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            live: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn len(&self) -> usize {
        self.live
    }

    fn entry(&self, id: EntryId) -> &BufferEntry<V> {
        self.slots[id.0].as_ref().expect("buffer entry is gone")
    }

    fn entry_mut(&mut self, id: EntryId) -> &mut BufferEntry<V> {
        self.slots[id.0].as_mut().expect("buffer entry is gone")
    }

    /// Appends an event under `stage`, with a predecessor edge labelled `version`.
    ///
    /// The `arrival` counter identifies one physical arrival of an event: every take of the same
    /// arrival under the same stage lands in the same entry (gaining one more predecessor edge),
    /// while a later arrival of an equal value gets an entry of its own.
    pub fn put(
        &mut self,
        stage: Rc<str>,
        event: EventWrapper<V>,
        arrival: u64,
        predecessor: Option<EntryId>,
        version: DeweyNumber,
    ) -> EntryId {
        if let Some(id) = predecessor {
            self.retain(id);
        }
        let edge = BufferEdge {
            predecessor,
            version,
        };
        if let Some(&id) = self.index.get(&(stage.clone(), arrival)) {
            self.entry_mut(id).edges.push(edge);
            return id;
        }
        let mut edges = SmallVec::new();
        edges.push(edge);
        let entry = BufferEntry {
            stage: stage.clone(),
            event,
            arrival,
            edges,
            refs: 0,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                EntryId(slot)
            }
            None => {
                self.slots.push(Some(entry));
                EntryId(self.slots.len() - 1)
            }
        };
        self.index.insert((stage, arrival), id);
        self.live += 1;
        id
    }

    /// Records one more owner of `id`.
    pub fn retain(&mut self, id: EntryId) {
        self.entry_mut(id).refs += 1;
    }

    /// Drops one owner of `id`.  When the last owner goes away, the entry is removed and the
    /// targets of its predecessor edges are released in turn.
    pub fn release(&mut self, id: EntryId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let remaining = {
                let entry = self.entry_mut(id);
                assert!(entry.refs > 0, "released a buffer entry nobody owns");
                entry.refs -= 1;
                entry.refs
            };
            if remaining > 0 {
                continue;
            }
            if let Some(entry) = self.slots[id.0].take() {
                self.index.remove(&(entry.stage.clone(), entry.arrival));
                self.free.push(id.0);
                self.live -= 1;
                pending.extend(entry.edges.into_iter().filter_map(|edge| edge.predecessor));
            }
        }
    }

    /// Sweeps out entries at or below the time horizon that have no owner left.  Entries still
    /// owned by a live branch, or by a younger entry's edge, stay where they are.  Returns how
    /// many entries were removed, transitively released predecessors included.
    pub fn prune(&mut self, horizon: Timestamp) -> usize {
        let stale = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|entry| (slot, entry)))
            .filter(|(_, entry)| entry.refs == 0 && entry.event.timestamp <= horizon)
            .map(|(slot, _)| EntryId(slot))
            .collect::<Vec<_>>();
        let before = self.live;
        for id in stale {
            if let Some(entry) = self.slots[id.0].take() {
                self.index.remove(&(entry.stage.clone(), entry.arrival));
                self.free.push(id.0);
                self.live -= 1;
                for predecessor in entry.edges.into_iter().filter_map(|edge| edge.predecessor) {
                    self.release(predecessor);
                }
            }
        }
        before - self.live
    }
}

impl<V> SharedBuffer<V>
where
    V: Clone,
{
    /// Returns every distinct match terminating at `id`, following only predecessor edges whose
    /// label is compatible with `version`.  Each distinct path back to a root yields one map of
    /// stage name to the events taken there, in the order they were taken.  Paths are returned in
    /// edge-insertion order, which makes extraction deterministic.
    pub fn extract_patches(&self, id: EntryId, version: &DeweyNumber) -> Vec<PatternMatch<V>> {
        let mut results = Vec::new();
        let mut stack = vec![(Some(id), version.clone(), Vec::new())];
        while let Some((node, version, mut path)) = stack.pop() {
            let current = match node {
                Some(current) => current,
                None => {
                    results.push(self.patch_of(&path));
                    continue;
                }
            };
            path.push(current);
            let compatible = self
                .entry(current)
                .edges
                .iter()
                .filter(|edge| version.is_compatible_with(&edge.version))
                .collect::<Vec<_>>();
            // Pushed in reverse so that the first-inserted edge is explored first.
            for (idx, edge) in compatible.iter().enumerate().rev() {
                let path = if idx == 0 {
                    std::mem::take(&mut path)
                } else {
                    path.clone()
                };
                stack.push((edge.predecessor, edge.version.clone(), path));
            }
        }
        results
    }

    /// Builds the stage map for one root-to-entry path.  The path arrives newest-first.
    fn patch_of(&self, path: &[EntryId]) -> PatternMatch<V> {
        let mut patch = PatternMatch::new();
        for id in path.iter().rev() {
            let entry = self.entry(*id);
            patch
                .entry(entry.stage.to_string())
                .or_insert_with(Vec::new)
                .push(entry.event.value.clone());
        }
        patch
    }
}

impl<V> Debug for SharedBuffer<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("live", &self.live)
            .finish()
    }
}
