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

//! Human-readable execution summaries
//!
//! After a materialization the engine exposes one summary line per executed
//! stage, of the form ` <StageName>: ...`. For a fused run the stage name is
//! the `->`-joined concatenation of the original stage names, which is how
//! operators confirm that fusion occurred:
//!
//! ```text
//!  ReadRange->MapBatches(dummy_map)->RandomShuffleMap: 4 blocks produced, 100 rows in 3ms
//!  RandomShuffleReduce: 4 blocks produced, 100 rows in 1ms
//! ```

use std::fmt;
use std::time::Duration;

/// Summary of one executed stage.
#[derive(Debug, Clone)]
pub struct StageSummary {
    name: String,
    blocks: usize,
    rows: usize,
    elapsed: Duration,
}

impl StageSummary {
    /// Creates a summary for a finished stage.
    pub fn new(name: &str, blocks: usize, rows: usize, elapsed: Duration) -> Self {
        Self {
            name: name.to_owned(),
            blocks,
            rows,
            elapsed,
        }
    }

    /// The (possibly fused) stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of blocks the stage produced.
    pub fn blocks(&self) -> usize {
        self.blocks
    }

    /// Number of rows the stage produced.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Wall time spent in the stage.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Per-stage summaries of the most recent materialization.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    summaries: Vec<StageSummary>,
}

impl ExecutionStats {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage summary.
    pub fn push(&mut self, summary: StageSummary) {
        self.summaries.push(summary);
    }

    /// The collected summaries, in execution order.
    pub fn summaries(&self) -> &[StageSummary] {
        &self.summaries
    }
}

impl fmt::Display for ExecutionStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for summary in &self.summaries {
            writeln!(
                f,
                " {}: {} blocks produced, {} rows in {}ms",
                summary.name,
                summary.blocks,
                summary.rows,
                summary.elapsed.as_millis()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_one_line_per_stage() {
        let mut stats = ExecutionStats::new();
        stats.push(StageSummary::new(
            "ReadRange->MapBatches(dummy_map)",
            2,
            10,
            Duration::from_millis(3),
        ));
        stats.push(StageSummary::new(
            "RandomizeBlockOrder",
            2,
            10,
            Duration::from_millis(1),
        ));
        let rendered = stats.to_string();
        assert!(rendered.contains(" ReadRange->MapBatches(dummy_map):"));
        assert!(rendered.contains(" RandomizeBlockOrder:"));
        assert_eq!(rendered.lines().count(), 2);
    }
}
