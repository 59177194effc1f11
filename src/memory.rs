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

//! In-process warehouse used for dry runs and tests

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use snafu::ensure;
use tracing::info;

use crate::gateway::{Lookup, TableRef, WarehouseGateway};
use crate::schema::TableSchema;
use crate::{error, Result};

/// A request seen by [`MemoryGateway`], in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    LookupDataset(String),
    CreateDataset { dataset: String, location: String },
    LookupTable(TableRef),
    CreateTable(TableRef),
    Insert { table: TableRef, rows: usize },
}

#[derive(Debug, Clone, Default)]
struct StoredTable {
    schema: TableSchema,
    rows: Vec<Value>,
}

/// Warehouse kept in memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // dataset name -> location
    datasets: DashMap<String, String>,
    tables: DashMap<TableRef, StoredTable>,
    requests: Mutex<Vec<Request>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a dataset
    pub fn with_dataset(self, dataset: impl Into<String>, location: impl Into<String>) -> Self {
        self.inner.datasets.insert(dataset.into(), location.into());
        self
    }

    /// Pre-create a table, and its dataset if needed
    pub fn with_table(self, table: TableRef, schema: TableSchema) -> Self {
        self.inner
            .datasets
            .entry(table.dataset.clone())
            .or_insert_with(|| "EU".to_string());
        self.inner.tables.insert(
            table,
            StoredTable {
                schema,
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn has_dataset(&self, dataset: &str) -> bool {
        self.inner.datasets.contains_key(dataset)
    }

    pub fn dataset_location(&self, dataset: &str) -> Option<String> {
        self.inner.datasets.get(dataset).map(|l| l.value().clone())
    }

    pub fn table_schema(&self, table: &TableRef) -> Option<TableSchema> {
        self.inner.tables.get(table).map(|t| t.schema.clone())
    }

    /// Rows stored in `table`, in insertion order
    pub fn rows(&self, table: &TableRef) -> Vec<Value> {
        self.inner
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<Request> {
        self.inner.requests.lock().clone()
    }

    fn record(&self, request: Request) {
        self.inner.requests.lock().push(request);
    }
}

impl WarehouseGateway for MemoryGateway {
    async fn lookup_dataset(&self, dataset: &str) -> Result<Lookup> {
        self.record(Request::LookupDataset(dataset.to_string()));
        Ok(if self.has_dataset(dataset) {
            Lookup::Found
        } else {
            Lookup::NotFound
        })
    }

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<()> {
        self.record(Request::CreateDataset {
            dataset: dataset.to_string(),
            location: location.to_string(),
        });
        ensure!(
            !self.has_dataset(dataset),
            error::WarehouseSnafu {
                msg: format!("dataset `{dataset}` already exists"),
            }
        );
        info!(dataset, location, "Created in-memory dataset");
        self.inner
            .datasets
            .insert(dataset.to_string(), location.to_string());
        Ok(())
    }

    async fn lookup_table(&self, table: &TableRef) -> Result<Lookup> {
        self.record(Request::LookupTable(table.clone()));
        Ok(if self.inner.tables.contains_key(table) {
            Lookup::Found
        } else {
            Lookup::NotFound
        })
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        self.record(Request::CreateTable(table.clone()));
        ensure!(
            self.has_dataset(&table.dataset),
            error::WarehouseSnafu {
                msg: format!("dataset `{}` does not exist", table.dataset),
            }
        );
        ensure!(
            !self.inner.tables.contains_key(table),
            error::WarehouseSnafu {
                msg: format!("table `{table}` already exists"),
            }
        );
        info!(table = %table, columns = schema.len(), "Created in-memory table");
        self.inner.tables.insert(
            table.clone(),
            StoredTable {
                schema: schema.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> Result<usize> {
        self.record(Request::Insert {
            table: table.clone(),
            rows: rows.len(),
        });
        let Some(mut stored) = self.inner.tables.get_mut(table) else {
            return error::WarehouseSnafu {
                msg: format!("table `{table}` does not exist"),
            }
            .fail();
        };
        stored.rows.extend_from_slice(rows);
        Ok(rows.len())
    }
}
