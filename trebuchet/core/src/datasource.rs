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

//! Datasource seam
//!
//! A [Datasource] supplies the raw partitioned input of a lazy plan. It is
//! an opaque external collaborator: the engine only ever asks it to produce
//! blocks, and a plan that has to re-derive its output after its snapshot
//! was consumed will ask again. Implementations that read from external
//! systems should therefore expect `read` to be called once per
//! re-execution of the plan's ancestor chain.

use async_trait::async_trait;

use crate::block::Block;
use crate::error::Result;

/// Supplies the source blocks of a plan.
#[async_trait]
pub trait Datasource: Send + Sync {
    /// The read stage name shown in plans and summaries, e.g. `"ReadRange"`.
    fn name(&self) -> &str;

    /// Produces the source blocks.
    async fn read(&self) -> Result<Vec<Block>>;
}

/// A datasource producing the integers `0..n` split into contiguous blocks.
#[derive(Debug, Clone)]
pub struct RangeSource {
    n: i64,
    parallelism: usize,
}

impl RangeSource {
    /// Creates a range source over `0..n` with the given block count.
    pub fn new(n: i64, parallelism: usize) -> Self {
        Self {
            n,
            parallelism: parallelism.max(1),
        }
    }
}

#[async_trait]
impl Datasource for RangeSource {
    fn name(&self) -> &str {
        "ReadRange"
    }

    async fn read(&self) -> Result<Vec<Block>> {
        let rows = (0..self.n).map(|v| vec![v]).collect();
        Ok(crate::block::split_rows(rows, self.parallelism))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block::total_rows;

    #[tokio::test]
    async fn test_range_source_blocks() -> Result<()> {
        let source = RangeSource::new(10, 3);
        let blocks = source.read().await?;
        assert_eq!(blocks.len(), 3);
        assert_eq!(total_rows(&blocks), 10);
        assert_eq!(blocks[0].rows()[0], vec![0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_range_source_zero_parallelism_clamped() -> Result<()> {
        let source = RangeSource::new(4, 0);
        let blocks = source.read().await?;
        assert_eq!(blocks.len(), 1);
        assert_eq!(total_rows(&blocks), 4);
        Ok(())
    }
}
