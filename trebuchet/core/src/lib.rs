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
#![warn(missing_docs)]

/// The current version of Trebuchet, derived from the Cargo package version.
pub const TREBUCHET_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prints the current Trebuchet version to stdout.
pub fn print_version() {
    println!("Trebuchet version: {TREBUCHET_VERSION}")
}

/// Blocks and rows, the unit of data flowing between stages.
pub mod block;
/// Datasource seam providing the raw partitioned input of a plan.
pub mod datasource;
/// Error types and result definitions for Trebuchet operations.
pub mod error;
/// Execution-resource requests and the equivalence rule used by fusion.
pub mod resource;
/// Sink seam consumed by `Write` stages.
pub mod sink;
/// Logical stages, operator kinds and compute strategies.
pub mod stage;
