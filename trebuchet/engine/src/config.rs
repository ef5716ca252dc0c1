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

//! Trebuchet optimizer configuration

use serde::{Deserialize, Serialize};

/// Controls how aggressively the optimizer merges and reorders stages.
///
/// Every flag combination is legal; flags only change how many executable
/// units the optimizer emits, never whether optimization succeeds. The rule
/// is passed explicitly to [crate::optimizer::FusionOptimizer] rather than
/// read from any ambient context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionRule {
    /// Global enable for merging adjacent compatible stages.
    pub fuse_stages: bool,
    /// Allow the read stage to merge into the stage that follows it.
    pub fuse_read_stages: bool,
    /// Allow one-to-one chains to merge into a following shuffle-map stage.
    pub fuse_shuffle_stages: bool,
    /// Allow commuting block-order randomization forward past later
    /// one-to-one stages to expose more fusable pairs.
    pub reorder_stages: bool,
}

impl Default for FusionRule {
    fn default() -> Self {
        Self {
            fuse_stages: true,
            fuse_read_stages: true,
            fuse_shuffle_stages: true,
            reorder_stages: true,
        }
    }
}

impl FusionRule {
    /// Creates the default rule with every optimization enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global fusion flag.
    pub fn with_fuse_stages(mut self, enabled: bool) -> Self {
        self.fuse_stages = enabled;
        self
    }

    /// Sets the read-stage fusion flag.
    pub fn with_fuse_read_stages(mut self, enabled: bool) -> Self {
        self.fuse_read_stages = enabled;
        self
    }

    /// Sets the shuffle-stage fusion flag.
    pub fn with_fuse_shuffle_stages(mut self, enabled: bool) -> Self {
        self.fuse_shuffle_stages = enabled;
        self
    }

    /// Sets the reordering flag.
    pub fn with_reorder_stages(mut self, enabled: bool) -> Self {
        self.reorder_stages = enabled;
        self
    }
}
