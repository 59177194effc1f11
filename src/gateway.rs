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

//! The seam between table setup and the remote warehouse

use std::fmt;

use serde_json::Value;

use crate::schema::TableSchema;
use crate::Result;

/// Outcome of an existence check. Failures other than "not found" are
/// returned as `Err` and never mean the resource is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found,
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found)
    }
}

/// Fully qualified table name within a project
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Dataset, table and row operations of a data warehouse
#[allow(async_fn_in_trait)]
pub trait WarehouseGateway {
    async fn lookup_dataset(&self, dataset: &str) -> Result<Lookup>;

    /// Create an empty dataset in `location`
    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<()>;

    async fn lookup_table(&self, table: &TableRef) -> Result<Lookup>;

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()>;

    /// Insert `rows` in a single request and return the number of rows accepted.
    ///
    /// `rows` are JSON objects. A request where any row is rejected fails as a
    /// whole with `RowsRejected`.
    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> Result<usize>;
}

impl<G: WarehouseGateway> WarehouseGateway for &G {
    async fn lookup_dataset(&self, dataset: &str) -> Result<Lookup> {
        (**self).lookup_dataset(dataset).await
    }

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<()> {
        (**self).create_dataset(dataset, location).await
    }

    async fn lookup_table(&self, table: &TableRef) -> Result<Lookup> {
        (**self).lookup_table(table).await
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        (**self).create_table(table, schema).await
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> Result<usize> {
        (**self).insert_rows(table, rows).await
    }
}
