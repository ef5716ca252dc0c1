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

//! Datasets
//!
//! A [Dataset] is a handle over a [StagePlan] plus the engine context the
//! plan materializes into. Transformations are lazy: each call derives a new
//! dataset whose plan has one more pending stage. `materialize` optimizes
//! the pending suffix, executes it and commits the result as the plan's
//! snapshot.
//!
//! Snapshots follow move semantics. Materializing a derived dataset
//! consumes the blocks of its nearest materialized ancestor, so two sibling
//! materializations fanning out from one lazy ancestor re-execute the
//! ancestor chain (including the source read) once each. An in-memory
//! source is never consumed: siblings re-run intermediate stages but not
//! the read.

use std::sync::Arc;

use log::debug;

use trebuchet_core::block::{concat_rows, split_rows, Block, Row};
use trebuchet_core::datasource::{Datasource, RangeSource};
use trebuchet_core::error::{Result, TrebuchetError};
use trebuchet_core::resource::ResourceRequest;
use trebuchet_core::sink::BlockSink;
use trebuchet_core::stage::{ComputeStrategy, Stage};

use crate::config::FusionRule;
use crate::display::ExecutionStats;
use crate::executor::StageExecutor;
use crate::optimizer::FusionOptimizer;
use crate::plan::{PlanSource, StagePlan};
use crate::store::BlockStore;

/// Shared engine state: the block store backing materialized snapshots.
///
/// All datasets derived from one root share a context, which is what lets a
/// descendant materialization find (and consume) its ancestor's snapshot.
#[derive(Debug, Default)]
pub struct EngineContext {
    store: BlockStore,
}

impl EngineContext {
    /// Creates a fresh context.
    pub fn new() -> Arc<EngineContext> {
        Arc::new(EngineContext::default())
    }

    /// The block store holding live snapshots.
    pub fn store(&self) -> &BlockStore {
        &self.store
    }
}

/// A lazily planned dataset.
#[derive(Clone)]
pub struct Dataset {
    ctx: Arc<EngineContext>,
    plan: StagePlan,
    rule: FusionRule,
    stats: Option<ExecutionStats>,
}

impl Dataset {
    /// Creates a dataset over the integers `0..n` read lazily from a
    /// [RangeSource] split into `parallelism` blocks.
    pub fn range(n: i64, parallelism: usize) -> Dataset {
        Self::read(Arc::new(RangeSource::new(n, parallelism)))
    }

    /// Creates a dataset reading lazily from `source`.
    pub fn read(source: Arc<dyn Datasource>) -> Dataset {
        Dataset {
            ctx: EngineContext::new(),
            plan: StagePlan::new(PlanSource::Lazy(source)),
            rule: FusionRule::default(),
            stats: None,
        }
    }

    /// Creates a dataset from in-memory values split into `parallelism`
    /// single-column blocks. The source blocks are never consumed.
    pub fn from_items(items: Vec<i64>, parallelism: usize) -> Dataset {
        let rows = items.into_iter().map(|v| vec![v]).collect();
        Self::from_blocks(split_rows(rows, parallelism))
    }

    /// Creates a dataset from in-memory blocks.
    pub fn from_blocks(blocks: Vec<Block>) -> Dataset {
        Dataset {
            ctx: EngineContext::new(),
            plan: StagePlan::new(PlanSource::InMemory(Arc::new(blocks))),
            rule: FusionRule::default(),
            stats: None,
        }
    }

    /// Replaces the fusion rule used by this dataset's materializations.
    pub fn with_fusion_rule(mut self, rule: FusionRule) -> Dataset {
        self.rule = rule;
        self
    }

    /// The underlying stage plan.
    pub fn plan(&self) -> &StagePlan {
        &self.plan
    }

    fn derive(&self, stage: Stage) -> Dataset {
        Dataset {
            ctx: self.ctx.clone(),
            plan: self.plan.derive(stage),
            rule: self.rule.clone(),
            stats: None,
        }
    }

    /// Appends a per-row map stage.
    pub fn map(&self, fun: impl Fn(Row) -> Row + Send + Sync + 'static) -> Dataset {
        self.derive(Stage::map("Map", Arc::new(fun)))
    }

    /// Appends a per-block map stage named `MapBatches({label})`.
    pub fn map_batches(
        &self,
        label: &str,
        fun: impl Fn(Vec<Row>) -> Vec<Row> + Send + Sync + 'static,
    ) -> Dataset {
        self.derive(Stage::map_batches(format!("MapBatches({label})"), Arc::new(fun)))
    }

    /// Appends a per-block map stage with an explicit compute strategy and
    /// resource request.
    pub fn map_batches_with(
        &self,
        label: &str,
        fun: impl Fn(Vec<Row>) -> Vec<Row> + Send + Sync + 'static,
        compute: ComputeStrategy,
        resources: ResourceRequest,
    ) -> Dataset {
        self.derive(
            Stage::map_batches(format!("MapBatches({label})"), Arc::new(fun))
                .with_compute(compute)
                .with_resources(resources),
        )
    }

    /// Appends a random shuffle as its map/reduce stage pair.
    pub fn random_shuffle(&self) -> Dataset {
        let mut ds = self.derive(Stage::random_shuffle_map(None));
        ds.plan.append(Stage::random_shuffle_reduce());
        ds
    }

    /// Appends a repartition stage. Output order is not guaranteed.
    pub fn repartition(&self, num_blocks: usize) -> Dataset {
        self.derive(Stage::repartition(num_blocks))
    }

    /// Appends a block-order randomization stage.
    pub fn randomize_block_order(&self) -> Dataset {
        self.derive(Stage::randomize_block_order(None))
    }

    /// Appends a global sort stage.
    pub fn sort(&self) -> Dataset {
        self.derive(Stage::sort())
    }

    /// Appends a zip stage pairing rows with `other`.
    ///
    /// The right-hand dataset must already be materialized; its snapshot
    /// blocks are copied, not consumed, so zipping does not disturb the
    /// right-hand side's lineage.
    pub fn zip(&self, other: &Dataset) -> Result<Dataset> {
        if other.plan.has_pending() {
            return Err(TrebuchetError::PlanError(
                "zip requires a materialized right-hand dataset".to_string(),
            ));
        }
        let id = other.plan.snapshot().peek().ok_or_else(|| {
            TrebuchetError::PlanError(
                "zip requires a materialized right-hand dataset".to_string(),
            )
        })?;
        let blocks = other.ctx.store.get_cloned(id).ok_or_else(|| {
            TrebuchetError::PlanError(
                "right-hand snapshot was already consumed".to_string(),
            )
        })?;
        Ok(self.derive(Stage::zip(blocks)))
    }

    /// Appends a write stage targeting `sink`.
    pub fn write(&self, sink: Arc<dyn BlockSink>) -> Dataset {
        self.derive(Stage::write(sink))
    }

    /// Executes the plan's pending suffix and commits the result.
    ///
    /// Resumes from the nearest materialized ancestor snapshot when one is
    /// still live, consuming it; otherwise re-executes the full chain from
    /// the source. Re-materializing an unchanged, still-live plan is a
    /// no-op.
    pub async fn materialize(&mut self) -> Result<()> {
        if !self.plan.has_pending() {
            if let Some(id) = self.plan.snapshot().peek() {
                if self.ctx.store.contains(id) {
                    return Ok(());
                }
            }
        }

        let preserve_order = self.plan.require_preserve_order();
        let optimizer = FusionOptimizer::new(self.rule.clone());

        // The ancestor snapshot is *moved* out of the store; a sibling
        // materialization fanning out from the same ancestor will find the
        // cell empty and re-derive from the source.
        let snapshot_blocks = self
            .plan
            .snapshot()
            .take()
            .and_then(|id| self.ctx.store.take(id));

        let (optimized, input) = match snapshot_blocks {
            Some(blocks) => {
                let optimized =
                    optimizer.optimize(None, self.plan.pending_stages().to_vec());
                (optimized, blocks)
            }
            None => match self.plan.source() {
                PlanSource::Lazy(source) => {
                    let read = Stage::read(source.clone());
                    (optimizer.optimize(Some(read), self.plan.all_stages()), vec![])
                }
                PlanSource::InMemory(blocks) => (
                    optimizer.optimize(None, self.plan.all_stages()),
                    blocks.as_ref().clone(),
                ),
            },
        };

        debug!(
            "materializing plan with {} optimized stages, preserve_order={preserve_order}",
            optimized.len()
        );
        let executor = StageExecutor::new(preserve_order);
        let (output, stats) = executor.execute(&optimized, input).await?;
        let snapshot = self.ctx.store.insert(output);
        self.plan.commit(optimized, snapshot);
        self.stats = Some(stats);
        Ok(())
    }

    /// Returns all rows of this dataset, materializing first if needed.
    ///
    /// Reading does not consume the snapshot.
    pub async fn take(&mut self) -> Result<Vec<Row>> {
        let live = self
            .plan
            .snapshot()
            .peek()
            .map(|id| self.ctx.store.contains(id))
            .unwrap_or(false);
        if self.plan.has_pending() || !live {
            self.materialize().await?;
        }
        let id = self.plan.snapshot().peek().ok_or_else(|| {
            TrebuchetError::Internal("materialization left no snapshot".to_string())
        })?;
        let blocks = self.ctx.store.get_cloned(id).ok_or_else(|| {
            TrebuchetError::Internal("snapshot missing from block store".to_string())
        })?;
        Ok(concat_rows(blocks))
    }

    /// The per-stage summary string of the most recent materialization, or
    /// an empty string before any execution.
    pub fn stats(&self) -> String {
        self.stats
            .as_ref()
            .map(ExecutionStats::to_string)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use trebuchet_core::sink::MemorySink;

    /// Wraps a range source and counts how often it is read.
    struct CountingSource {
        inner: RangeSource,
        reads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Datasource for CountingSource {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn read(&self) -> Result<Vec<Block>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read().await
        }
    }

    fn counted_inc(counter: &Arc<AtomicUsize>) -> impl Fn(Row) -> Row + Send + Sync {
        let counter = counter.clone();
        move |row: Row| {
            counter.fetch_add(1, Ordering::SeqCst);
            vec![row[0] + 1]
        }
    }

    fn values(rows: Vec<Row>) -> Vec<i64> {
        rows.into_iter().map(|row| row[0]).collect()
    }

    fn stage_names(stages: &[Stage]) -> Vec<&str> {
        stages.iter().map(|s| s.name()).collect()
    }

    #[tokio::test]
    async fn test_stage_linking() -> Result<()> {
        let ds = Dataset::range(10, 2);
        assert_eq!(ds.plan().committed_stages().len(), 0);
        assert_eq!(ds.plan().pending_stages().len(), 0);
        assert!(ds.plan().last_optimized_stages().is_none());

        let mut ds = ds.map(|row| vec![row[0] + 1]);
        assert_eq!(ds.plan().committed_stages().len(), 0);
        assert_eq!(stage_names(ds.plan().pending_stages()), vec!["Map"]);
        assert!(ds.plan().last_optimized_stages().is_none());

        ds.materialize().await?;
        assert_eq!(stage_names(ds.plan().committed_stages()), vec!["Map"]);
        assert_eq!(ds.plan().pending_stages().len(), 0);
        assert_eq!(
            stage_names(ds.plan().last_optimized_stages().unwrap()),
            vec!["ReadRange->Map"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_randomize_reordered_past_map_batches() -> Result<()> {
        let mut ds = Dataset::range(10, 2)
            .randomize_block_order()
            .map_batches("dummy_map", |rows| rows);
        ds.materialize().await?;

        let stats = ds.stats();
        assert!(
            stats.contains(" ReadRange->MapBatches(dummy_map):"),
            "unexpected stats: {stats}"
        );
        assert!(
            stats.contains(" RandomizeBlockOrder:"),
            "unexpected stats: {stats}"
        );
        assert_eq!(ds.plan().last_optimized_stages().unwrap().len(), 2);

        let mut rows = values(ds.take().await?);
        rows.sort();
        assert_eq!(rows, (0..10).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_shuffle_emits_map_and_reduce_stages() -> Result<()> {
        let mut ds = Dataset::range(3, 3)
            .map_batches("dummy_map", |rows| rows)
            .map_batches("dummy_map", |rows| rows)
            .random_shuffle();
        ds.materialize().await?;
        assert_eq!(
            stage_names(ds.plan().last_optimized_stages().unwrap()),
            vec![
                "ReadRange->MapBatches(dummy_map)->MapBatches(dummy_map)->RandomShuffleMap",
                "RandomShuffleReduce",
            ]
        );
        let mut rows = values(ds.take().await?);
        rows.sort();
        assert_eq!(rows, vec![0, 1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_fusion() -> Result<()> {
        let sink = Arc::new(MemorySink::new());
        let mut ds = Dataset::range(100, 4)
            .map_batches("dummy_map", |rows| rows)
            .write(sink.clone());
        ds.materialize().await?;
        assert_eq!(
            stage_names(ds.plan().last_optimized_stages().unwrap()),
            vec!["ReadRange->MapBatches(dummy_map)->Write"]
        );
        assert_eq!(sink.num_rows(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_write_does_not_reorder_randomize_block() -> Result<()> {
        let sink = Arc::new(MemorySink::new());
        let mut ds = Dataset::range(100, 4)
            .randomize_block_order()
            .map_batches("dummy_map", |rows| rows)
            .write(sink.clone());
        ds.materialize().await?;

        // The randomize switches order with the following map_batches, but
        // not with the tailing write stage.
        assert_eq!(
            stage_names(ds.plan().last_optimized_stages().unwrap()),
            vec![
                "ReadRange->MapBatches(dummy_map)",
                "RandomizeBlockOrder",
                "Write",
            ]
        );
        assert_eq!(sink.num_rows(), 100);
        Ok(())
    }

    #[tokio::test]
    async fn test_lazy_fanout_rereads_source() -> Result<()> {
        let reads = Arc::new(AtomicUsize::new(0));
        let maps = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(CountingSource {
            inner: RangeSource::new(3, 1),
            reads: reads.clone(),
        });

        let ds = Dataset::read(source);
        let ds1 = ds.map(counted_inc(&maps));
        let mut ds2 = ds1.map(counted_inc(&maps));
        let mut ds3 = ds1.map(counted_inc(&maps));

        assert_eq!(values(ds2.take().await?), vec![2, 3, 4]);
        assert_eq!(values(ds3.take().await?), vec![2, 3, 4]);

        // Each sibling materialization re-executed the chain from the
        // source: the data is read twice and the first map runs twice.
        assert_eq!(reads.load(Ordering::SeqCst), 2);
        assert_eq!(maps.load(Ordering::SeqCst), 2 * 3 + 3 + 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_fanout_does_not_consume_source() -> Result<()> {
        let maps = Arc::new(AtomicUsize::new(0));
        let ds = Dataset::from_items((0..10).collect(), 10);
        let ds1 = ds.map(counted_inc(&maps));
        let mut ds2 = ds1.map(counted_inc(&maps));
        let mut ds3 = ds1.map(counted_inc(&maps));

        assert_eq!(values(ds2.take().await?), (2..12).collect::<Vec<_>>());
        assert_eq!(values(ds3.take().await?), (2..12).collect::<Vec<_>>());

        // No source read is involved, but the intermediate map stage still
        // runs once per sibling.
        assert_eq!(maps.load(Ordering::SeqCst), 2 * 10 + 10 + 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_materialize_consumes_ancestor_snapshot() -> Result<()> {
        let maps = Arc::new(AtomicUsize::new(0));
        let mut ds = Dataset::from_items((0..10).collect(), 5).map(counted_inc(&maps));
        ds.materialize().await?;
        assert_eq!(maps.load(Ordering::SeqCst), 10);

        let mut d1 = ds.map(counted_inc(&maps));
        let mut d2 = ds.map(counted_inc(&maps));

        // d1 resumes from ds's snapshot and consumes it.
        d1.materialize().await?;
        assert_eq!(maps.load(Ordering::SeqCst), 20);

        // d2 finds the snapshot gone and re-executes the whole chain.
        d2.materialize().await?;
        assert_eq!(maps.load(Ordering::SeqCst), 40);

        assert_eq!(values(d1.take().await?), (2..12).collect::<Vec<_>>());
        assert_eq!(values(d2.take().await?), (2..12).collect::<Vec<_>>());

        // Only the two descendant snapshots stay live in the store.
        assert_eq!(ds.ctx.store.num_snapshots(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_rematerialize_is_a_noop() -> Result<()> {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(CountingSource {
            inner: RangeSource::new(5, 1),
            reads: reads.clone(),
        });
        let mut ds = Dataset::read(source).map(|row| row);
        ds.materialize().await?;
        ds.materialize().await?;
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_require_preserve_order() -> Result<()> {
        let ds = Dataset::range(100, 4)
            .map_batches("dummy_map", |rows| rows)
            .sort();
        assert!(ds.plan().require_preserve_order());

        let mut rhs = Dataset::range(100, 4).map_batches("dummy_map", |rows| rows);
        rhs.materialize().await?;
        let ds2 = Dataset::range(100, 4)
            .map_batches("dummy_map", |rows| rows)
            .zip(&rhs)?;
        assert!(ds2.plan().require_preserve_order());

        let ds3 = Dataset::range(100, 4)
            .map_batches("dummy_map", |rows| rows)
            .repartition(10);
        assert!(!ds3.plan().require_preserve_order());
        Ok(())
    }

    #[tokio::test]
    async fn test_zip_requires_materialized_rhs() {
        let rhs = Dataset::range(10, 2).map(|row| row);
        let result = Dataset::range(10, 2).zip(&rhs);
        assert!(matches!(result, Err(TrebuchetError::PlanError(_))));
    }

    #[tokio::test]
    async fn test_zip_content() -> Result<()> {
        let mut rhs = Dataset::range(5, 2).map(|row| vec![row[0] * 10]);
        rhs.materialize().await?;
        let mut ds = Dataset::range(5, 2).zip(&rhs)?;
        let rows = ds.take().await?;
        assert_eq!(rows[0], vec![0, 0]);
        assert_eq!(rows[4], vec![4, 40]);
        Ok(())
    }

    #[tokio::test]
    async fn test_actor_pool_stage_with_sort() -> Result<()> {
        let mut ds = Dataset::range(16, 8)
            .map_batches_with(
                "double",
                |rows| rows.into_iter().map(|row| vec![row[0] * 2]).collect(),
                ComputeStrategy::actor_pool(1, 4),
                ResourceRequest::new(),
            )
            .sort();
        let rows = values(ds.take().await?);
        assert_eq!(rows, (0..16).map(|v| v * 2).collect::<Vec<_>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_repartition_changes_block_count() -> Result<()> {
        let mut ds = Dataset::range(10, 2).repartition(5);
        ds.materialize().await?;
        let summaries = ds.stats();
        assert!(
            summaries.contains(" Repartition:"),
            "unexpected stats: {summaries}"
        );
        let id = ds.plan().snapshot().peek().unwrap();
        assert_eq!(ds.ctx.store.get_cloned(id).unwrap().len(), 5);
        Ok(())
    }
}
