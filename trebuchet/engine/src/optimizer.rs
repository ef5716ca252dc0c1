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

//! Stage fusion
//!
//! The [FusionOptimizer] rewrites a logical stage sequence into an
//! equivalent, shorter one before dispatch. It runs two passes:
//!
//! 1. An optional reorder pass that commutes `RandomizeBlockOrder` stages
//!    forward past one-to-one stages, flushing them before the next barrier
//!    or `Write` stage. Randomization only permutes block order, so moving
//!    it past a per-row transform exposes more fusable adjacent pairs.
//! 2. A left-to-right fusion pass that merges each adjacent pair allowed by
//!    the kind table, the compute strategies and the resource-equivalence
//!    rule. A shuffle-map and its reduce counterpart are always emitted as
//!    two stages: the shuffle is an all-to-all barrier and cannot become a
//!    single-pass operator.
//!
//! Fusion is a pure, synchronous planning step; incompatibility between
//! neighbors is not an error, it simply yields separate stages.

use log::debug;

use trebuchet_core::resource::SchedulingHint;
use trebuchet_core::stage::{OperatorKind, Stage};

use crate::config::FusionRule;

/// Rewrites stage sequences according to a [FusionRule].
pub struct FusionOptimizer {
    rule: FusionRule,
}

/// Whether `up` may absorb `down`, before flag and compatibility gating.
///
/// The table is closed over [OperatorKind]: a read merges into whatever
/// follows it, one-to-one stages chain with each other and may feed the map
/// side of a shuffle, and barrier kinds neither absorb nor get absorbed
/// (except a read into a randomize, whose map phase is trivially empty).
fn kinds_fusable(up: OperatorKind, down: OperatorKind) -> bool {
    use OperatorKind::*;
    match (up, down) {
        (Read, Map | MapBatches | Write | RandomizeBlockOrder | RandomShuffleMap) => {
            true
        }
        (Map | MapBatches, Map | MapBatches | Write | RandomShuffleMap) => true,
        _ => false,
    }
}

impl FusionOptimizer {
    /// Creates an optimizer applying `rule`.
    pub fn new(rule: FusionRule) -> Self {
        Self { rule }
    }

    /// Produces the optimized sequence for `stages`, with `read_stage`
    /// prepended when the plan executes from a lazy source.
    ///
    /// An empty input optimizes to an empty output; with all fusion flags
    /// disabled this is an identity pass (modulo reordering).
    pub fn optimize(&self, read_stage: Option<Stage>, stages: Vec<Stage>) -> Vec<Stage> {
        let stages = if self.rule.reorder_stages {
            reorder_randomize_stages(stages)
        } else {
            stages
        };

        let mut output: Vec<Stage> = Vec::with_capacity(stages.len() + 1);
        let mut current: Option<Stage> = read_stage;
        for stage in stages {
            match current.take() {
                None => current = Some(stage),
                Some(upstream) => {
                    if self.can_fuse(&upstream, &stage) {
                        debug!("fusing stage {} into {}", upstream.name(), stage.name());
                        current = Some(upstream.fuse(stage));
                    } else {
                        output.push(upstream);
                        current = Some(stage);
                    }
                }
            }
        }
        output.extend(current);

        for stage in &mut output {
            if is_spread_candidate(stage.kind()) && stage.resources().is_unconstrained()
            {
                stage.apply_scheduling_hint(SchedulingHint::Spread);
            }
        }
        output
    }

    fn can_fuse(&self, up: &Stage, down: &Stage) -> bool {
        if !self.rule.fuse_stages {
            return false;
        }
        if !kinds_fusable(up.kind(), down.kind()) {
            return false;
        }
        if up.kind() == OperatorKind::Read && !self.rule.fuse_read_stages {
            return false;
        }
        if down.kind() == OperatorKind::RandomShuffleMap {
            if !self.rule.fuse_shuffle_stages {
                return false;
            }
            // The map side of a shuffle runs as tasks; a persistent actor
            // pool cannot feed it from within the same stage.
            if up.kind() != OperatorKind::Read && !up.compute().is_tasks() {
                return false;
            }
        }
        if up.kind() == OperatorKind::Read {
            // A read makes no requirements of its own and adopts the
            // downstream stage's compute strategy and resources.
            return true;
        }
        up.compute().is_fusable_with(down.compute())
            && up.resources().is_equivalent_to(down.resources())
    }
}

/// Moves pure `RandomizeBlockOrder` stages forward past one-to-one stages.
///
/// Buffered randomize stages are flushed immediately before the next barrier
/// stage or `Write` (a write always keeps its position), otherwise they land
/// at the end of the sequence. Multiple randomize stages buffered together
/// collapse to one: permuting twice is still one permutation.
fn reorder_randomize_stages(stages: Vec<Stage>) -> Vec<Stage> {
    let mut output = Vec::with_capacity(stages.len());
    let mut buffered: Option<Stage> = None;
    for stage in stages {
        // Only a bare randomize stage commutes; a fused one already carries
        // other operators and must keep its position.
        if stage.kind() == OperatorKind::RandomizeBlockOrder && stage.ops().len() == 1 {
            if buffered.is_some() {
                debug!("collapsing duplicate {} stage", stage.name());
            } else {
                buffered = Some(stage);
            }
            continue;
        }
        if stage.kind().is_barrier() || stage.kind() == OperatorKind::Write {
            output.extend(buffered.take());
        }
        output.push(stage);
    }
    output.extend(buffered);
    output
}

fn is_spread_candidate(kind: OperatorKind) -> bool {
    matches!(
        kind,
        OperatorKind::RandomShuffleMap
            | OperatorKind::RandomShuffleReduce
            | OperatorKind::Repartition
    )
}
