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

//! Blocks and rows
//!
//! A [Block] is the unit of data handed between stages: an ordered list of
//! rows, where each row is a tuple of column values. A dataset is an ordered
//! list of blocks; operators either transform blocks independently
//! (one-to-one stages) or consume the whole block list at once (barriers).

use serde::{Deserialize, Serialize};

/// A single row: a tuple of column values.
pub type Row = Vec<i64>;

/// An ordered collection of rows, the unit of data exchanged between stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    rows: Vec<Row>,
}

impl Block {
    /// Creates a block from the given rows.
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Creates a single-column block from a sequence of values.
    pub fn from_values(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    /// Returns the rows of this block.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consumes the block, returning its rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns the number of rows in this block.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this block holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Returns the total number of rows across `blocks`.
pub fn total_rows(blocks: &[Block]) -> usize {
    blocks.iter().map(|b| b.num_rows()).sum()
}

/// Flattens `blocks` into a single row list, preserving block order.
pub fn concat_rows(blocks: Vec<Block>) -> Vec<Row> {
    blocks.into_iter().flat_map(|b| b.into_rows()).collect()
}

/// Splits `rows` into `num_blocks` blocks of near-equal size.
///
/// The last blocks may be one row smaller when the row count does not divide
/// evenly. `num_blocks` of zero yields a single block.
pub fn split_rows(rows: Vec<Row>, num_blocks: usize) -> Vec<Block> {
    let num_blocks = num_blocks.max(1);
    let total = rows.len();
    let base = total / num_blocks;
    let remainder = total % num_blocks;

    let mut blocks = Vec::with_capacity(num_blocks);
    let mut iter = rows.into_iter();
    for i in 0..num_blocks {
        let size = base + usize::from(i < remainder);
        blocks.push(Block::new(iter.by_ref().take(size).collect()));
    }
    blocks
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_values() {
        let block = Block::from_values(0..3);
        assert_eq!(block.rows(), &[vec![0], vec![1], vec![2]]);
        assert_eq!(block.num_rows(), 3);
    }

    #[test]
    fn test_split_rows_uneven() {
        let rows: Vec<Row> = (0..10).map(|v| vec![v]).collect();
        let blocks = split_rows(rows, 4);
        assert_eq!(blocks.len(), 4);
        assert_eq!(
            blocks.iter().map(|b| b.num_rows()).collect::<Vec<_>>(),
            vec![3, 3, 2, 2]
        );
        assert_eq!(total_rows(&blocks), 10);
    }

    #[test]
    fn test_split_rows_more_blocks_than_rows() {
        let rows: Vec<Row> = (0..2).map(|v| vec![v]).collect();
        let blocks = split_rows(rows, 5);
        assert_eq!(blocks.len(), 5);
        assert_eq!(total_rows(&blocks), 2);
    }

    #[test]
    fn test_concat_preserves_order() {
        let blocks = vec![Block::from_values(0..2), Block::from_values(2..4)];
        let rows = concat_rows(blocks);
        assert_eq!(rows, vec![vec![0], vec![1], vec![2], vec![3]]);
    }
}
