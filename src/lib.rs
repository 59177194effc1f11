// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Provision BigQuery datasets and tables from a JSON schema and bulk load
//! JSON rows into them, split into requests below the insert payload quota.

pub mod bigquery;
pub mod chunk;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod rows;
pub mod schema;
pub mod setup;
pub mod size;

pub use self::bigquery::{BigQueryGateway, Credentials};
pub use self::chunk::{ChunkPlan, MAX_PAYLOAD};
pub use self::error::{Error, Result};
pub use self::gateway::{Lookup, TableRef, WarehouseGateway};
pub use self::memory::MemoryGateway;
pub use self::rows::{RowBatch, RowRecord};
pub use self::schema::{FieldMode, FieldSpec, FieldType, TableSchema};
pub use self::setup::{SetupConfig, SetupReport, SetupState, TableSetup};
pub use self::size::{estimate_size, Footprint, SharedValue, SizeEstimator};
