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

use std::path::Path;

use serde_json::{Map, Value};
use snafu::ResultExt;

use crate::size::{self, Footprint, SizeEstimator};
use crate::{error, Result};

/// One row to insert. Rows are not checked against the table schema.
pub type RowRecord = Map<String, Value>;

/// All rows read from a data file, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    rows: Vec<Value>,
}

impl RowBatch {
    /// Parse the JSON text of an array of row objects
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| {
            error::MalformedDataSnafu {
                msg: format!("invalid JSON, {e}"),
            }
            .build()
        })?;
        Self::from_value(value)
    }

    /// Read and parse a data file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).context(error::ReadFileSnafu { path })?;
        Self::from_json(&json)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Array(rows) = value else {
            return error::MalformedDataSnafu {
                msg: "expected a JSON array of row objects",
            }
            .fail();
        };
        if let Some(index) = rows.iter().position(|row| !row.is_object()) {
            return error::MalformedDataSnafu {
                msg: format!("row #{index} is not a JSON object"),
            }
            .fail();
        }
        Ok(Self { rows })
    }

    pub fn from_records(records: impl IntoIterator<Item = RowRecord>) -> Self {
        Self {
            rows: records.into_iter().map(Value::Object).collect(),
        }
    }

    /// Every entry is a JSON object
    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Approximate in-memory size of the whole batch
    pub fn estimated_size(&self) -> usize {
        SizeEstimator::new().estimate(self)
    }
}

impl Footprint for RowBatch {
    fn identity(&self) -> usize {
        self as *const RowBatch as usize
    }

    fn shallow_size(&self) -> usize {
        size::ARRAY_OVERHEAD + size::ARRAY_SLOT * self.rows.len()
    }

    fn for_each_child(&self, visit: &mut dyn FnMut(&dyn Footprint)) {
        self.rows.iter().for_each(|row| visit(row));
    }
}
