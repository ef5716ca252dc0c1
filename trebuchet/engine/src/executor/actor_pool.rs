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

//! Actor-pool dispatch
//!
//! Runs a stage's per-block chain on a fixed pool of persistent workers fed
//! from a shared queue. Workers drain the queue in whatever order they get
//! to it, so results arrive unordered; when the plan demands order
//! preservation the results are reassembled by input index before being
//! handed back.

use std::sync::Arc;

use log::debug;
use tokio::sync::{mpsc, Mutex};

use trebuchet_core::block::Block;
use trebuchet_core::error::{Result, TrebuchetError};
use trebuchet_core::stage::StageOp;

use super::apply_chain;

/// Applies `ops` to every block using a pool of at most `pool_size` workers.
pub(crate) async fn map_blocks(
    pool_size: usize,
    ops: Arc<Vec<StageOp>>,
    blocks: Vec<Block>,
    preserve_order: bool,
) -> Result<Vec<Block>> {
    let pool_size = pool_size.min(blocks.len()).max(1);
    let (tx, rx) = mpsc::unbounded_channel::<(usize, Block)>();
    for item in blocks.into_iter().enumerate() {
        tx.send(item).map_err(|_| {
            TrebuchetError::Internal("actor pool queue closed before start".to_string())
        })?;
    }
    drop(tx);

    let queue = Arc::new(Mutex::new(rx));
    let mut workers = Vec::with_capacity(pool_size);
    for worker_id in 0..pool_size {
        let queue = queue.clone();
        let ops = ops.clone();
        workers.push(tokio::spawn(async move {
            let mut completed: Vec<(usize, Block)> = Vec::new();
            loop {
                // Hold the queue lock only while popping; the chain runs
                // without it so workers make progress concurrently.
                let next = { queue.lock().await.recv().await };
                match next {
                    Some((index, block)) => {
                        let block = apply_chain(&ops, block).await?;
                        completed.push((index, block));
                    }
                    None => break,
                }
            }
            debug!(
                "actor pool worker {worker_id} finished {} blocks",
                completed.len()
            );
            Ok::<_, TrebuchetError>(completed)
        }));
    }

    let mut results = Vec::new();
    for worker in workers {
        results.extend(worker.await??);
    }
    if preserve_order {
        results.sort_by_key(|(index, _)| *index);
    }
    Ok(results.into_iter().map(|(_, block)| block).collect())
}
