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

//! Stage plans
//!
//! A [StagePlan] records how a dataset is derived from its source as an
//! ordered sequence of logical stages, split at the last materialization
//! point:
//!
//! ```text
//!  source ──► [ committed stages ] ──► snapshot ──► [ pending stages ]
//!                                         │
//!                                         └── shared with derived plans
//! ```
//!
//! `committed` stages have already been folded into a materialized snapshot;
//! `pending` stages have been appended since. Deriving a new plan clones
//! both sequences and shares the parent's snapshot cell, which is what gives
//! fan-out its move semantics: whichever descendant materializes first
//! consumes the shared snapshot, and the others must re-derive from the
//! source.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use trebuchet_core::block::Block;
use trebuchet_core::datasource::Datasource;
use trebuchet_core::stage::Stage;

use crate::store::{SnapshotCell, SnapshotId};

/// Where a plan's input blocks come from.
#[derive(Clone)]
pub enum PlanSource {
    /// Blocks are produced on demand by a datasource; every re-execution of
    /// the plan's ancestor chain reads from it again.
    Lazy(Arc<dyn Datasource>),
    /// Blocks were supplied directly in memory. They are never consumed, so
    /// re-execution starts from them without any read.
    InMemory(Arc<Vec<Block>>),
}

impl PlanSource {
    /// Returns true for sources that must be re-read on re-execution.
    pub fn is_lazy(&self) -> bool {
        matches!(self, PlanSource::Lazy(_))
    }
}

impl Debug for PlanSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanSource::Lazy(source) => write!(f, "Lazy({})", source.name()),
            PlanSource::InMemory(blocks) => {
                write!(f, "InMemory({} blocks)", blocks.len())
            }
        }
    }
}

/// The derivation history of a dataset, split at the last materialization.
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// The plan's input.
    source: PlanSource,
    /// Stages already folded into a materialized snapshot.
    committed: Vec<Stage>,
    /// Stages appended since the last materialization.
    pending: Vec<Stage>,
    /// The optimizer's output from the most recent materialization, or
    /// `None` before any optimization has run.
    last_optimized: Option<Vec<Stage>>,
    /// Reference to the snapshot backing `committed`, shared with plans
    /// derived from this one.
    snapshot: SnapshotCell,
}

impl StagePlan {
    /// Creates an empty plan over `source`.
    pub fn new(source: PlanSource) -> Self {
        Self {
            source,
            committed: vec![],
            pending: vec![],
            last_optimized: None,
            snapshot: SnapshotCell::new(),
        }
    }

    /// Appends `stage` to the pending suffix. Always succeeds.
    pub fn append(&mut self, stage: Stage) {
        self.pending.push(stage);
    }

    /// Returns a new plan derived from this one with `stage` appended.
    ///
    /// The derived plan shares this plan's snapshot cell.
    pub fn derive(&self, stage: Stage) -> StagePlan {
        let mut child = self.clone();
        child.append(stage);
        child
    }

    /// Returns the plan's input.
    pub fn source(&self) -> &PlanSource {
        &self.source
    }

    /// Stages already folded into a materialized snapshot.
    pub fn committed_stages(&self) -> &[Stage] {
        &self.committed
    }

    /// Stages appended since the last materialization.
    pub fn pending_stages(&self) -> &[Stage] {
        &self.pending
    }

    /// The most recent fused/reordered sequence produced by the optimizer.
    pub fn last_optimized_stages(&self) -> Option<&[Stage]> {
        self.last_optimized.as_deref()
    }

    /// Returns true if stages have been appended since the last
    /// materialization.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The full logical sequence, committed then pending.
    pub fn all_stages(&self) -> Vec<Stage> {
        self.committed
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }

    /// Returns the snapshot cell backing this plan's committed prefix.
    pub fn snapshot(&self) -> &SnapshotCell {
        &self.snapshot
    }

    /// Returns true if any stage in the plan demands input row order.
    ///
    /// An unordered operation such as `repartition` does not demand order,
    /// so a plan ending in one reports false unless a later stage (`sort`,
    /// `zip`) requires it.
    pub fn require_preserve_order(&self) -> bool {
        self.committed
            .iter()
            .chain(self.pending.iter())
            .any(|stage| stage.demands_order())
    }

    /// Folds the pending suffix into the committed prefix after a successful
    /// materialization.
    ///
    /// Records `optimized` as the optimizer's latest output and installs a
    /// fresh snapshot cell pointing at `snapshot`. Plans derived before this
    /// materialization keep observing the old (now consumed) cell; plans
    /// derived afterwards share the new snapshot.
    pub(crate) fn commit(&mut self, optimized: Vec<Stage>, snapshot: SnapshotId) {
        self.committed.append(&mut self.pending);
        self.last_optimized = Some(optimized);
        self.snapshot = SnapshotCell::new();
        self.snapshot.set(snapshot);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use trebuchet_core::datasource::RangeSource;
    use trebuchet_core::stage::Stage;
    use uuid::Uuid;

    fn lazy_plan() -> StagePlan {
        StagePlan::new(PlanSource::Lazy(Arc::new(RangeSource::new(10, 2))))
    }

    fn map_stage() -> Stage {
        Stage::map("Map", Arc::new(|row| row))
    }

    #[test]
    fn test_new_plan_is_empty() {
        let plan = lazy_plan();
        assert_eq!(plan.committed_stages().len(), 0);
        assert_eq!(plan.pending_stages().len(), 0);
        assert!(plan.last_optimized_stages().is_none());
        assert!(!plan.has_pending());
    }

    #[test]
    fn test_append_grows_pending_only() {
        let mut plan = lazy_plan();
        plan.append(map_stage());
        assert_eq!(plan.committed_stages().len(), 0);
        assert_eq!(plan.pending_stages().len(), 1);
        assert_eq!(plan.pending_stages()[0].name(), "Map");
        assert!(plan.last_optimized_stages().is_none());
    }

    #[test]
    fn test_commit_folds_pending() {
        let mut plan = lazy_plan();
        plan.append(map_stage());
        let optimized = vec![map_stage()];
        plan.commit(optimized, Uuid::new_v4());
        assert_eq!(plan.committed_stages().len(), 1);
        assert_eq!(plan.committed_stages()[0].name(), "Map");
        assert_eq!(plan.pending_stages().len(), 0);
        assert!(plan.last_optimized_stages().is_some());
    }

    #[test]
    fn test_derive_shares_snapshot_cell() {
        let mut parent = lazy_plan();
        parent.append(map_stage());
        let id = Uuid::new_v4();
        parent.snapshot().set(id);

        let child = parent.derive(map_stage());
        assert_eq!(child.pending_stages().len(), 2);
        assert_eq!(child.snapshot().peek(), Some(id));

        // Consuming through the child empties the parent's view as well.
        child.snapshot().take();
        assert_eq!(parent.snapshot().peek(), None);
    }

    #[test]
    fn test_commit_detaches_snapshot_from_older_derivations() {
        let mut parent = lazy_plan();
        parent.append(map_stage());
        let older_child = parent.derive(map_stage());

        parent.commit(vec![], Uuid::new_v4());
        assert!(parent.snapshot().peek().is_some());
        // The derivation taken before the commit still sees the old cell.
        assert!(older_child.snapshot().peek().is_none());
    }

    #[test]
    fn test_require_preserve_order() {
        let mut plan = lazy_plan();
        plan.append(Stage::map_batches("MapBatches(f)", Arc::new(|rows| rows)));
        plan.append(Stage::sort());
        assert!(plan.require_preserve_order());

        let mut plan = lazy_plan();
        plan.append(Stage::map_batches("MapBatches(f)", Arc::new(|rows| rows)));
        plan.append(Stage::repartition(10));
        assert!(!plan.require_preserve_order());

        let mut plan = lazy_plan();
        plan.append(Stage::zip(vec![]));
        assert!(plan.require_preserve_order());
    }
}
