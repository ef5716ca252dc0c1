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

//! Stage execution
//!
//! The [StageExecutor] runs an optimized stage sequence. Each stage is an
//! independently schedulable unit: its per-block operator chain is
//! dispatched either as one task per block or through a persistent
//! actor pool, and an optional trailing barrier operator consumes the
//! whole block list at once. Data crosses a shuffle boundary as scattered
//! per-partition chunks, which only the matching shuffle-reduce stage may
//! consume.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use trebuchet_core::block::{concat_rows, split_rows, total_rows, Block, Row};
use trebuchet_core::datasource::Datasource;
use trebuchet_core::error::{Result, TrebuchetError};
use trebuchet_core::stage::{ComputeStrategy, Stage, StageOp};

use crate::display::{ExecutionStats, StageSummary};

mod actor_pool;

/// Data flowing between two stages.
pub enum StageData {
    /// An ordered list of blocks.
    Blocks(Vec<Block>),
    /// Shuffle-map output: for each input block, one chunk per partition.
    ShuffleParts(Vec<Vec<Block>>),
}

impl StageData {
    fn shape(&self) -> (usize, usize) {
        match self {
            StageData::Blocks(blocks) => (blocks.len(), total_rows(blocks)),
            StageData::ShuffleParts(parts) => (
                parts.iter().map(|chunks| chunks.len()).sum(),
                parts.iter().map(|chunks| total_rows(chunks)).sum(),
            ),
        }
    }
}

/// Runs optimized stage sequences.
pub struct StageExecutor {
    preserve_order: bool,
}

impl StageExecutor {
    /// Creates an executor. `preserve_order` controls whether out-of-order
    /// dispatch (the actor pool) must reassemble results in input order.
    pub fn new(preserve_order: bool) -> Self {
        Self { preserve_order }
    }

    /// Executes `stages` over `input`, returning the output blocks and the
    /// per-stage summaries.
    pub async fn execute(
        &self,
        stages: &[Stage],
        input: Vec<Block>,
    ) -> Result<(Vec<Block>, ExecutionStats)> {
        let mut stats = ExecutionStats::new();
        let mut data = StageData::Blocks(input);
        for (index, stage) in stages.iter().enumerate() {
            let start = Instant::now();
            data = self.execute_stage(stage, data).await?;
            let (blocks, rows) = data.shape();
            let summary = StageSummary::new(stage.name(), blocks, rows, start.elapsed());
            info!(
                "=== Stage [{index}] {} finished: {blocks} blocks, {rows} rows in {}ms ===",
                stage.name(),
                summary.elapsed().as_millis()
            );
            stats.push(summary);
        }
        match data {
            StageData::Blocks(blocks) => Ok((blocks, stats)),
            StageData::ShuffleParts(_) => Err(TrebuchetError::Internal(
                "plan ended with an unreduced shuffle".to_string(),
            )),
        }
    }

    async fn execute_stage(&self, stage: &Stage, data: StageData) -> Result<StageData> {
        let mut read: Option<Arc<dyn Datasource>> = None;
        let mut chain: Vec<StageOp> = Vec::new();
        let mut barrier: Option<StageOp> = None;
        for op in stage.ops() {
            match op {
                StageOp::Read { source } => read = Some(source.clone()),
                StageOp::Map { .. } | StageOp::MapBatches { .. } | StageOp::Write { .. } => {
                    chain.push(op.clone())
                }
                other => barrier = Some(other.clone()),
            }
        }

        let mut blocks = match data {
            StageData::Blocks(blocks) => blocks,
            StageData::ShuffleParts(parts) => match barrier.take() {
                Some(StageOp::RandomShuffleReduce) => shuffle_reduce(parts),
                _ => {
                    return Err(TrebuchetError::Internal(
                        "scattered shuffle output must feed a shuffle-reduce stage"
                            .to_string(),
                    ))
                }
            },
        };

        if let Some(source) = read {
            debug!("stage {}: reading source {}", stage.name(), source.name());
            blocks = source.read().await?;
        }

        if !chain.is_empty() {
            let chain = Arc::new(chain);
            blocks = match stage.compute() {
                ComputeStrategy::Tasks => run_tasks(chain, blocks).await?,
                ComputeStrategy::ActorPool { max_size, .. } => {
                    actor_pool::map_blocks(*max_size, chain, blocks, self.preserve_order)
                        .await?
                }
            };
        }

        match barrier {
            None => Ok(StageData::Blocks(blocks)),
            Some(op) => apply_barrier(&op, blocks),
        }
    }
}

/// Applies the per-block operator chain to one block.
pub(crate) async fn apply_chain(ops: &[StageOp], mut block: Block) -> Result<Block> {
    for op in ops {
        block = match op {
            StageOp::Map { fun } => {
                Block::new(block.into_rows().into_iter().map(|row| fun(row)).collect())
            }
            StageOp::MapBatches { fun } => Block::new(fun(block.into_rows())),
            StageOp::Write { sink } => {
                sink.write_block(&block).await?;
                block
            }
            other => {
                return Err(TrebuchetError::Internal(format!(
                    "operator {other:?} cannot run in a per-block chain"
                )))
            }
        };
    }
    Ok(block)
}

/// Dispatches one task per block.
async fn run_tasks(ops: Arc<Vec<StageOp>>, blocks: Vec<Block>) -> Result<Vec<Block>> {
    let mut handles = Vec::with_capacity(blocks.len());
    for block in blocks {
        let ops = ops.clone();
        handles.push(tokio::spawn(async move { apply_chain(&ops, block).await }));
    }
    let joined = futures::future::try_join_all(handles).await?;
    joined.into_iter().collect()
}

fn apply_barrier(op: &StageOp, blocks: Vec<Block>) -> Result<StageData> {
    match op {
        StageOp::RandomizeBlockOrder { seed } => {
            let mut blocks = blocks;
            match seed {
                Some(seed) => blocks.shuffle(&mut StdRng::seed_from_u64(*seed)),
                None => blocks.shuffle(&mut rand::thread_rng()),
            }
            Ok(StageData::Blocks(blocks))
        }
        StageOp::RandomShuffleMap { output_partitions } => {
            let partitions = output_partitions.unwrap_or(blocks.len()).max(1);
            let mut rng = rand::thread_rng();
            let parts = blocks
                .into_iter()
                .map(|block| {
                    let mut chunks: Vec<Vec<Row>> = vec![Vec::new(); partitions];
                    for row in block.into_rows() {
                        chunks[rng.gen_range(0..partitions)].push(row);
                    }
                    chunks.into_iter().map(Block::new).collect::<Vec<Block>>()
                })
                .collect();
            Ok(StageData::ShuffleParts(parts))
        }
        StageOp::RandomShuffleReduce => Err(TrebuchetError::Internal(
            "shuffle-reduce requires scattered input".to_string(),
        )),
        StageOp::Repartition { num_blocks } => Ok(StageData::Blocks(split_rows(
            concat_rows(blocks),
            *num_blocks,
        ))),
        StageOp::Sort => {
            let target = blocks.len().max(1);
            let mut rows = concat_rows(blocks);
            rows.sort();
            Ok(StageData::Blocks(split_rows(rows, target)))
        }
        StageOp::Zip { rhs } => zip_blocks(blocks, rhs),
        other => Err(TrebuchetError::Internal(format!(
            "operator {other:?} is not a barrier"
        ))),
    }
}

/// Merges scattered chunks per partition, shuffling rows within each.
fn shuffle_reduce(parts: Vec<Vec<Block>>) -> Vec<Block> {
    let partitions = parts.iter().map(|chunks| chunks.len()).max().unwrap_or(0);
    let mut rng = rand::thread_rng();
    let mut output = Vec::with_capacity(partitions);
    for partition in 0..partitions {
        let mut rows: Vec<Row> = Vec::new();
        for chunks in &parts {
            if let Some(block) = chunks.get(partition) {
                rows.extend(block.rows().iter().cloned());
            }
        }
        rows.shuffle(&mut rng);
        output.push(Block::new(rows));
    }
    output
}

fn zip_blocks(lhs: Vec<Block>, rhs: &[Block]) -> Result<StageData> {
    let mut rhs_rows = rhs.iter().flat_map(|b| b.rows().iter().cloned());
    let mut output = Vec::with_capacity(lhs.len());
    for block in lhs {
        let rows = block
            .into_rows()
            .into_iter()
            .map(|mut row| {
                let mut other = rhs_rows.next().ok_or_else(|| {
                    TrebuchetError::PlanError(
                        "zipped datasets must have the same number of rows".to_string(),
                    )
                })?;
                row.append(&mut other);
                Ok(row)
            })
            .collect::<Result<Vec<Row>>>()?;
        output.push(Block::new(rows));
    }
    if rhs_rows.next().is_some() {
        return Err(TrebuchetError::PlanError(
            "zipped datasets must have the same number of rows".to_string(),
        ));
    }
    Ok(StageData::Blocks(output))
}
