// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! In-memory block store and snapshot cells
//!
//! Materialized output blocks are held in a [BlockStore] keyed by
//! [SnapshotId]. A plan refers to its snapshot through a [SnapshotCell],
//! which is shared between a plan and the plans derived from it. Snapshot
//! blocks follow move semantics: a descendant materialization *takes* the
//! blocks out of the store, after which the cell is empty and a sibling
//! materialization has to re-derive them from the source.

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use parking_lot::Mutex;
use uuid::Uuid;

use trebuchet_core::block::Block;

/// Identifier of a materialized snapshot held in the [BlockStore].
pub type SnapshotId = Uuid;

/// A shared, clearable reference to a snapshot.
///
/// Cloning a cell yields another handle to the same slot, which is how a
/// derived plan observes (and consumes) its ancestor's snapshot.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Option<SnapshotId>>>,
}

impl SnapshotCell {
    /// Creates an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a snapshot id, replacing any previous one.
    pub fn set(&self, id: SnapshotId) {
        *self.inner.lock() = Some(id);
    }

    /// Removes and returns the snapshot id, leaving the cell empty.
    pub fn take(&self) -> Option<SnapshotId> {
        self.inner.lock().take()
    }

    /// Returns the snapshot id without clearing the cell.
    pub fn peek(&self) -> Option<SnapshotId> {
        *self.inner.lock()
    }
}

/// Holds the blocks of live snapshots.
#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: DashMap<SnapshotId, Vec<Block>>,
}

impl BlockStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `blocks` under a freshly generated snapshot id.
    pub fn insert(&self, blocks: Vec<Block>) -> SnapshotId {
        let id = Uuid::new_v4();
        debug!("block store: snapshot {id} holds {} blocks", blocks.len());
        self.blocks.insert(id, blocks);
        id
    }

    /// Moves the blocks of `id` out of the store.
    ///
    /// Returns `None` if the snapshot was already consumed or released.
    pub fn take(&self, id: SnapshotId) -> Option<Vec<Block>> {
        let taken = self.blocks.remove(&id).map(|(_, blocks)| blocks);
        if taken.is_some() {
            debug!("block store: snapshot {id} consumed");
        }
        taken
    }

    /// Returns a copy of the blocks of `id`, leaving the snapshot live.
    pub fn get_cloned(&self, id: SnapshotId) -> Option<Vec<Block>> {
        self.blocks.get(&id).map(|entry| entry.value().clone())
    }

    /// Returns true if `id` is still live.
    pub fn contains(&self, id: SnapshotId) -> bool {
        self.blocks.contains_key(&id)
    }

    /// Releases the blocks of `id`, if still live.
    pub fn release(&self, id: SnapshotId) {
        if self.blocks.remove(&id).is_some() {
            debug!("block store: snapshot {id} released");
        }
    }

    /// Number of live snapshots.
    pub fn num_snapshots(&self) -> usize {
        self.blocks.len()
    }
}
