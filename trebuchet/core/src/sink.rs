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

//! Sink seam consumed by `Write` stages.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::block::{Block, Row};
use crate::error::Result;

/// Receives the output blocks of a `Write` stage.
///
/// Blocks may arrive concurrently from independent tasks; implementations
/// must be safe to call from multiple tasks at once.
#[async_trait]
pub trait BlockSink: Send + Sync {
    /// Writes one block.
    async fn write_block(&self, block: &Block) -> Result<()>;
}

/// A sink collecting written rows in memory. Intended for tests and
/// small local runs.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<Vec<Row>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all rows written so far.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }

    /// Returns the number of rows written so far.
    pub fn num_rows(&self) -> usize {
        self.rows.lock().len()
    }
}

#[async_trait]
impl BlockSink for MemorySink {
    async fn write_block(&self, block: &Block) -> Result<()> {
        self.rows.lock().extend(block.rows().iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_collects_rows() -> Result<()> {
        let sink = MemorySink::new();
        sink.write_block(&Block::from_values(0..3)).await?;
        sink.write_block(&Block::from_values(3..5)).await?;
        assert_eq!(sink.num_rows(), 5);
        Ok(())
    }
}
