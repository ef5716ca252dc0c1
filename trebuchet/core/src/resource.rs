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

//! Execution-resource requests
//!
//! Each stage carries a [ResourceRequest] describing what it asks of the
//! worker dispatch layer: resource amounts keyed by name (`num_cpus`,
//! `num_gpus`, custom resources) plus an optional scheduling hint. Two
//! requests are *equivalent* when every key has the same effective value,
//! where an absent key, an explicit `None` and an explicit zero all mean
//! "no requirement". Equivalence is what the fusion optimizer consults when
//! deciding whether two adjacent stages may be merged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resource key for CPU cores.
pub const RESOURCE_NUM_CPUS: &str = "num_cpus";
/// Resource key for GPUs.
pub const RESOURCE_NUM_GPUS: &str = "num_gpus";

/// A hint to the worker dispatch layer about task placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulingHint {
    /// Spread tasks across distinct workers. Applied to shuffle-style stages
    /// so that all-to-all data movement is not funneled through one worker.
    Spread,
}

/// The execution resources requested by a single stage.
///
/// A request declared as `{}`, `{"num_cpus": None}` or `{"num_cpus": 0}` is
/// treated as making no requirement at all; an explicit positive amount is a
/// real requirement and blocks fusion with a stage that lacks it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Requested amount per resource key. `None` means the key was mentioned
    /// but left unset, which is the same as not mentioning it at all.
    resources: BTreeMap<String, Option<f64>>,
    /// Optional placement hint, set by the optimizer for shuffle stages.
    scheduling_hint: Option<SchedulingHint>,
}

impl ResourceRequest {
    /// Creates an empty request (no requirements).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested CPU amount.
    pub fn with_cpus(self, num_cpus: impl Into<Option<f64>>) -> Self {
        self.with_resource(RESOURCE_NUM_CPUS, num_cpus)
    }

    /// Sets the requested GPU amount.
    pub fn with_gpus(self, num_gpus: impl Into<Option<f64>>) -> Self {
        self.with_resource(RESOURCE_NUM_GPUS, num_gpus)
    }

    /// Sets the requested amount for an arbitrary resource key.
    pub fn with_resource(mut self, key: &str, amount: impl Into<Option<f64>>) -> Self {
        self.resources.insert(key.to_owned(), amount.into());
        self
    }

    /// Sets the placement hint.
    pub fn with_scheduling_hint(mut self, hint: SchedulingHint) -> Self {
        self.scheduling_hint = Some(hint);
        self
    }

    /// Returns the placement hint, if any.
    pub fn scheduling_hint(&self) -> Option<SchedulingHint> {
        self.scheduling_hint
    }

    /// Returns the effective amount requested for `key`.
    ///
    /// Absent keys and explicit `None` values both report zero.
    pub fn effective(&self, key: &str) -> f64 {
        self.resources.get(key).copied().flatten().unwrap_or(0.0)
    }

    /// Returns true if this request makes no requirement at all.
    pub fn is_unconstrained(&self) -> bool {
        self.scheduling_hint.is_none()
            && self.resources.values().all(|v| v.unwrap_or(0.0) == 0.0)
    }

    /// Returns true if `self` and `other` are equivalent for fusion purposes.
    ///
    /// Every key appearing in either request must have the same effective
    /// value in both, and the scheduling hints must match. The relation is
    /// symmetric by construction.
    pub fn is_equivalent_to(&self, other: &ResourceRequest) -> bool {
        if self.scheduling_hint != other.scheduling_hint {
            return false;
        }
        self.resources
            .keys()
            .chain(other.resources.keys())
            .all(|key| self.effective(key) == other.effective(key))
    }

    /// Merges `other` into `self`, with `other` winning on conflicting keys.
    ///
    /// Used when two stages fuse: the merged stage carries the union of the
    /// two (equivalent) requests so no explicitly named key is dropped.
    pub fn merged(&self, other: &ResourceRequest) -> ResourceRequest {
        let mut resources = self.resources.clone();
        for (key, amount) in &other.resources {
            resources.insert(key.clone(), *amount);
        }
        ResourceRequest {
            resources,
            scheduling_hint: other.scheduling_hint.or(self.scheduling_hint),
        }
    }
}
