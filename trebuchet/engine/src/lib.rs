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

#![doc = include_str!("../README.md")]

/// Fusion rule configuration.
pub mod config;
/// The public dataset API.
pub mod dataset;
/// Per-stage execution summaries.
pub mod display;
/// Task and actor-pool stage execution.
pub mod executor;
/// The stage fusion optimizer.
pub mod optimizer;
/// Stage plans with committed/pending split.
pub mod plan;
/// Block store and snapshot cells backing lineage.
pub mod store;

pub use config::FusionRule;
pub use dataset::{Dataset, EngineContext};
pub use optimizer::FusionOptimizer;
pub use plan::{PlanSource, StagePlan};
