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

//! Logical stages
//!
//! A [Stage] is one transformation step in a dataset's derivation plan. The
//! fusion optimizer may merge adjacent stages into one; a fused stage keeps
//! the `->`-joined names of its constituents and the concatenation of their
//! operator payloads, so the executor can run the merged chain as a single
//! schedulable unit:
//!
//! ```text
//!  ReadRange   MapBatches(f)   RandomShuffleMap      RandomShuffleReduce
//!     └────────────┴──────────────────┘                       │
//!      "ReadRange->MapBatches(f)->RandomShuffleMap"   "RandomShuffleReduce"
//! ```

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::block::{Block, Row};
use crate::datasource::Datasource;
use crate::resource::{ResourceRequest, SchedulingHint};
use crate::sink::BlockSink;

/// The closed set of operator kinds a stage can represent.
///
/// Fusability rules are defined over pairs of kinds, so the set is a closed
/// enumeration rather than an open trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    /// Produces the source blocks of a plan from a [Datasource].
    Read,
    /// Applies a function to every row independently.
    Map,
    /// Applies a function to every block independently.
    MapBatches,
    /// Map side of a random shuffle: scatters rows into partition chunks.
    RandomShuffleMap,
    /// Reduce side of a random shuffle: merges chunks per partition.
    RandomShuffleReduce,
    /// Rebalances rows into a fixed number of blocks.
    Repartition,
    /// Permutes the order of blocks without touching their contents.
    RandomizeBlockOrder,
    /// Writes blocks to a [BlockSink], passing them through unchanged.
    Write,
    /// Globally sorts all rows.
    Sort,
    /// Pairs rows with an already-materialized right-hand side.
    Zip,
}

impl OperatorKind {
    /// Returns true for kinds that transform blocks independently of one
    /// another and preserve row count per block.
    pub fn is_one_to_one(&self) -> bool {
        matches!(
            self,
            OperatorKind::Map | OperatorKind::MapBatches | OperatorKind::Write
        )
    }

    /// Returns true for kinds that need the whole block list at once.
    ///
    /// Barrier kinds end a fused chain: nothing fuses out of them.
    pub fn is_barrier(&self) -> bool {
        matches!(
            self,
            OperatorKind::RandomShuffleMap
                | OperatorKind::RandomShuffleReduce
                | OperatorKind::Repartition
                | OperatorKind::RandomizeBlockOrder
                | OperatorKind::Sort
                | OperatorKind::Zip
        )
    }

    /// Returns true for kinds whose semantics depend on input row order.
    pub fn demands_input_order(&self) -> bool {
        matches!(self, OperatorKind::Sort | OperatorKind::Zip)
    }
}

/// How a stage's work is dispatched to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeStrategy {
    /// One independently scheduled task per unit of work.
    Tasks,
    /// A pool of persistent workers fed from a queue.
    ActorPool {
        /// Minimum number of workers kept alive.
        min_size: usize,
        /// Maximum number of workers the pool may grow to.
        max_size: usize,
    },
}

impl ComputeStrategy {
    /// Creates an actor-pool strategy with the given bounds.
    pub fn actor_pool(min_size: usize, max_size: usize) -> Self {
        ComputeStrategy::ActorPool { min_size, max_size }
    }

    /// Returns true if this is the task-based strategy.
    pub fn is_tasks(&self) -> bool {
        matches!(self, ComputeStrategy::Tasks)
    }

    /// Returns true if two strategies may share a fused stage.
    ///
    /// Task execution and persistent-actor execution never mix; actor pools
    /// only fuse when their bounds match exactly.
    pub fn is_fusable_with(&self, other: &ComputeStrategy) -> bool {
        self == other
    }
}

impl Default for ComputeStrategy {
    fn default() -> Self {
        ComputeStrategy::Tasks
    }
}

/// A per-row transformation function.
pub type MapFn = Arc<dyn Fn(Row) -> Row + Send + Sync>;
/// A per-block transformation function.
pub type BatchFn = Arc<dyn Fn(Vec<Row>) -> Vec<Row> + Send + Sync>;

/// The executable payload of a stage.
///
/// A freshly appended stage carries exactly one op; a fused stage carries
/// the concatenated ops of its constituents in order.
#[derive(Clone)]
pub enum StageOp {
    /// Produce the source blocks.
    Read {
        /// The datasource to read from.
        source: Arc<dyn Datasource>,
    },
    /// Apply a function to each row.
    Map {
        /// The row transformation.
        fun: MapFn,
    },
    /// Apply a function to each block's rows.
    MapBatches {
        /// The block transformation.
        fun: BatchFn,
    },
    /// Scatter each block's rows into per-partition chunks.
    RandomShuffleMap {
        /// Number of output partitions; defaults to the input block count.
        output_partitions: Option<usize>,
    },
    /// Merge scattered chunks per partition and shuffle rows within each.
    RandomShuffleReduce,
    /// Rebalance all rows into `num_blocks` blocks.
    Repartition {
        /// Number of output blocks.
        num_blocks: usize,
    },
    /// Permute block order.
    RandomizeBlockOrder {
        /// Optional seed for a deterministic permutation.
        seed: Option<u64>,
    },
    /// Globally sort all rows.
    Sort,
    /// Pair rows with a captured right-hand side.
    Zip {
        /// Materialized blocks of the right-hand dataset.
        rhs: Vec<Block>,
    },
    /// Write each block to the sink.
    Write {
        /// The destination sink.
        sink: Arc<dyn BlockSink>,
    },
}

impl Debug for StageOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOp::Read { source } => write!(f, "Read({})", source.name()),
            StageOp::Map { .. } => write!(f, "Map"),
            StageOp::MapBatches { .. } => write!(f, "MapBatches"),
            StageOp::RandomShuffleMap { .. } => write!(f, "RandomShuffleMap"),
            StageOp::RandomShuffleReduce => write!(f, "RandomShuffleReduce"),
            StageOp::Repartition { num_blocks } => {
                write!(f, "Repartition({num_blocks})")
            }
            StageOp::RandomizeBlockOrder { .. } => write!(f, "RandomizeBlockOrder"),
            StageOp::Sort => write!(f, "Sort"),
            StageOp::Zip { .. } => write!(f, "Zip"),
            StageOp::Write { .. } => write!(f, "Write"),
        }
    }
}

/// One logical transformation step in a dataset's derivation plan.
#[derive(Debug, Clone)]
pub struct Stage {
    /// Stage name; `->`-joined after fusion.
    name: String,
    /// Operator kind, used by the fusability rules.
    kind: OperatorKind,
    /// Dispatch strategy for this stage's work.
    compute: ComputeStrategy,
    /// Execution resources requested for this stage.
    resources: ResourceRequest,
    /// True if this stage's semantics depend on input row order.
    demands_order: bool,
    /// Executable payload, in application order.
    ops: Vec<StageOp>,
}

impl Stage {
    fn new(name: impl Into<String>, kind: OperatorKind, op: StageOp) -> Self {
        Self {
            name: name.into(),
            kind,
            compute: ComputeStrategy::default(),
            resources: ResourceRequest::default(),
            demands_order: kind.demands_input_order(),
            ops: vec![op],
        }
    }

    /// Creates the read stage for `source`, named after the source.
    ///
    /// Read stages make no resource requirements of their own and adopt the
    /// downstream stage's compute strategy and resources when fused.
    pub fn read(source: Arc<dyn Datasource>) -> Self {
        let name = source.name().to_owned();
        Self::new(name, OperatorKind::Read, StageOp::Read { source })
    }

    /// Creates a per-row map stage.
    pub fn map(name: impl Into<String>, fun: MapFn) -> Self {
        Self::new(name, OperatorKind::Map, StageOp::Map { fun })
    }

    /// Creates a per-block map stage.
    pub fn map_batches(name: impl Into<String>, fun: BatchFn) -> Self {
        Self::new(name, OperatorKind::MapBatches, StageOp::MapBatches { fun })
    }

    /// Creates the map side of a random shuffle.
    pub fn random_shuffle_map(output_partitions: Option<usize>) -> Self {
        Self::new(
            "RandomShuffleMap",
            OperatorKind::RandomShuffleMap,
            StageOp::RandomShuffleMap { output_partitions },
        )
    }

    /// Creates the reduce side of a random shuffle.
    pub fn random_shuffle_reduce() -> Self {
        Self::new(
            "RandomShuffleReduce",
            OperatorKind::RandomShuffleReduce,
            StageOp::RandomShuffleReduce,
        )
    }

    /// Creates a repartition stage. Output order is not guaranteed.
    pub fn repartition(num_blocks: usize) -> Self {
        Self::new(
            "Repartition",
            OperatorKind::Repartition,
            StageOp::Repartition { num_blocks },
        )
    }

    /// Creates a block-order randomization stage.
    pub fn randomize_block_order(seed: Option<u64>) -> Self {
        Self::new(
            "RandomizeBlockOrder",
            OperatorKind::RandomizeBlockOrder,
            StageOp::RandomizeBlockOrder { seed },
        )
    }

    /// Creates a global sort stage.
    pub fn sort() -> Self {
        Self::new("Sort", OperatorKind::Sort, StageOp::Sort)
    }

    /// Creates a zip stage against a materialized right-hand side.
    pub fn zip(rhs: Vec<Block>) -> Self {
        Self::new("Zip", OperatorKind::Zip, StageOp::Zip { rhs })
    }

    /// Creates a write stage targeting `sink`.
    pub fn write(sink: Arc<dyn BlockSink>) -> Self {
        Self::new("Write", OperatorKind::Write, StageOp::Write { sink })
    }

    /// Sets the compute strategy.
    pub fn with_compute(mut self, compute: ComputeStrategy) -> Self {
        self.compute = compute;
        self
    }

    /// Sets the resource request.
    pub fn with_resources(mut self, resources: ResourceRequest) -> Self {
        self.resources = resources;
        self
    }

    /// Returns the stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the operator kind.
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    /// Returns the compute strategy.
    pub fn compute(&self) -> &ComputeStrategy {
        &self.compute
    }

    /// Returns the resource request.
    pub fn resources(&self) -> &ResourceRequest {
        &self.resources
    }

    /// Returns true if this stage's semantics depend on input row order.
    pub fn demands_order(&self) -> bool {
        self.demands_order
    }

    /// Returns the executable payload.
    pub fn ops(&self) -> &[StageOp] {
        &self.ops
    }

    /// Applies a scheduling hint to this stage's resource request.
    pub fn apply_scheduling_hint(&mut self, hint: SchedulingHint) {
        self.resources = self.resources.clone().with_scheduling_hint(hint);
    }

    /// Merges `downstream` into this stage, producing the fused stage.
    ///
    /// The fused stage is named `"{self}->{downstream}"`, behaves as the
    /// downstream kind for further fusion decisions and carries both
    /// payloads in order. A read upstream adopts the downstream's compute
    /// strategy and resources; otherwise the two requests are already
    /// equivalent and are merged key-wise.
    pub fn fuse(mut self, downstream: Stage) -> Stage {
        let name = format!("{}->{}", self.name, downstream.name);
        let resources = if self.kind == OperatorKind::Read {
            downstream.resources
        } else {
            self.resources.merged(&downstream.resources)
        };
        self.ops.extend(downstream.ops);
        Stage {
            name,
            kind: downstream.kind,
            compute: downstream.compute,
            resources,
            demands_order: self.demands_order || downstream.demands_order,
            ops: self.ops,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::datasource::RangeSource;

    fn identity_batch() -> BatchFn {
        Arc::new(|rows| rows)
    }

    #[test]
    fn test_fused_name_and_kind() {
        let read = Stage::read(Arc::new(RangeSource::new(10, 2)));
        let map = Stage::map_batches("MapBatches(dummy_map)", identity_batch());
        let fused = read.fuse(map);
        assert_eq!(fused.name(), "ReadRange->MapBatches(dummy_map)");
        assert_eq!(fused.kind(), OperatorKind::MapBatches);
        assert_eq!(fused.ops().len(), 2);
    }

    #[test]
    fn test_read_adopts_downstream_compute() {
        let read = Stage::read(Arc::new(RangeSource::new(10, 2)));
        let map = Stage::map_batches("MapBatches(f)", identity_batch())
            .with_compute(ComputeStrategy::actor_pool(1, 4));
        let fused = read.fuse(map);
        assert_eq!(fused.compute(), &ComputeStrategy::actor_pool(1, 4));
    }

    #[test]
    fn test_fusion_propagates_order_demand() {
        let sort = Stage::sort();
        assert!(sort.demands_order());
        let map = Stage::map_batches("MapBatches(f)", identity_batch());
        assert!(!map.demands_order());
    }

    #[test]
    fn test_kind_classification() {
        assert!(OperatorKind::Map.is_one_to_one());
        assert!(OperatorKind::Write.is_one_to_one());
        assert!(!OperatorKind::Read.is_one_to_one());
        assert!(OperatorKind::Repartition.is_barrier());
        assert!(OperatorKind::RandomizeBlockOrder.is_barrier());
        assert!(!OperatorKind::MapBatches.is_barrier());
        assert!(OperatorKind::Sort.demands_input_order());
        assert!(OperatorKind::Zip.demands_input_order());
        assert!(!OperatorKind::Repartition.demands_input_order());
    }
}
