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

//! Dataset and table provisioning followed by a chunked bulk load
//!
//! A run moves through `SchemaLoaded -> DatasetChecked -> TableChecked ->
//! [DataLoaded ->] Done` and never goes back. Only a "not found" answer from a
//! lookup leads to creating the resource, any other lookup failure ends the
//! run. Chunks are inserted in order and a failed chunk ends the run as well,
//! chunks committed before it stay in the table.

use std::path::Path;

use derive_builder::Builder;
use futures::{stream, StreamExt};
use snafu::ResultExt;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, Dispatch, Instrument, Span};

use crate::chunk::{ChunkPlan, MAX_PAYLOAD};
use crate::gateway::{Lookup, TableRef, WarehouseGateway};
use crate::rows::RowBatch;
use crate::schema::TableSchema;
use crate::{error, Error, Result};

/// Location of datasets created by a run unless configured otherwise
pub const DEFAULT_LOCATION: &str = "EU";

/// Tunables of a setup run
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SetupConfig {
    /// Location of a dataset that has to be created
    #[builder(default = "DEFAULT_LOCATION.to_string()")]
    pub location: String,
    /// Byte quota of a single insert request
    #[builder(default = "MAX_PAYLOAD")]
    pub max_payload: usize,
    /// Chunk inserts allowed in flight at once
    #[builder(default = "1")]
    pub parallelism: usize,
}

impl SetupConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.max_payload == Some(0) {
            return Err("max payload must be greater than 0".to_string());
        }
        if self.parallelism == Some(0) {
            return Err("parallelism must be greater than 0".to_string());
        }
        if matches!(&self.location, Some(location) if location.is_empty()) {
            return Err("location must not be empty".to_string());
        }
        Ok(())
    }
}

impl SetupConfig {
    pub fn builder() -> SetupConfigBuilder {
        SetupConfigBuilder::default()
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            max_payload: MAX_PAYLOAD,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetupState {
    #[default]
    SchemaLoaded,
    DatasetChecked,
    TableChecked,
    DataLoaded,
    Done,
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub state: SetupState,
    pub dataset_created: bool,
    pub table_created: bool,
    /// Estimated size of the loaded rows, `None` when no data was given
    pub estimated_size: Option<usize>,
    /// Chunks planned, empty ones included
    pub chunks: usize,
    /// Indices of the chunks that were inserted
    pub committed: Vec<usize>,
    pub rows_inserted: usize,
}

impl SetupReport {
    fn advance(&mut self, state: SetupState) {
        debug!(from = ?self.state, to = ?state, "Setup state changed");
        self.state = state;
    }
}

/// Provisions one table through a [`WarehouseGateway`] and loads rows into it
pub struct TableSetup<G> {
    gateway: G,
    table: TableRef,
    config: SetupConfig,
    span: Span,
    dispatch: Option<Dispatch>,
}

impl<G: WarehouseGateway> TableSetup<G> {
    pub fn new(gateway: G, table: TableRef, config: SetupConfig) -> Self {
        let span = info_span!("table_setup", table = %table);
        Self {
            gateway,
            table,
            config,
            span,
            dispatch: None,
        }
    }

    /// Send the events of every run to `dispatch` instead of the current default
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        // Recreate the span so it belongs to the new subscriber.
        self.span = tracing::dispatcher::with_default(&dispatch, || {
            info_span!("table_setup", table = %self.table)
        });
        self.dispatch = Some(dispatch);
        self
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Ensure the table exists and insert `rows` when given
    pub async fn run(&self, schema: &TableSchema, rows: Option<&RowBatch>) -> Result<SetupReport> {
        self.scoped(async {
            let mut report = SetupReport::default();
            self.ensure_table(schema, &mut report).await?;
            if let Some(batch) = rows {
                self.load(batch, &mut report).await?;
            }
            report.advance(SetupState::Done);
            Ok::<_, Error>(report)
        })
        .await
    }

    /// Same as [`run`](Self::run) with the rows read from `data_path`.
    ///
    /// The data file is only read once the table exists.
    pub async fn run_with_data_file(
        &self,
        schema: &TableSchema,
        data_path: Option<&Path>,
    ) -> Result<SetupReport> {
        self.scoped(async {
            let mut report = SetupReport::default();
            self.ensure_table(schema, &mut report).await?;
            if let Some(path) = data_path {
                info!("Loading data now...");
                let batch = RowBatch::from_path(path)?;
                self.load(&batch, &mut report).await?;
            }
            report.advance(SetupState::Done);
            Ok::<_, Error>(report)
        })
        .await
    }

    async fn scoped<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        let fut = fut.instrument(self.span.clone());
        match &self.dispatch {
            Some(dispatch) => fut.with_subscriber(dispatch.clone()).await,
            None => fut.await,
        }
    }

    async fn ensure_table(&self, schema: &TableSchema, report: &mut SetupReport) -> Result<()> {
        let dataset = &self.table.dataset;
        let lookup = self
            .gateway
            .lookup_dataset(dataset)
            .await
            .context(error::ResourceLookupSnafu {
                resource: format!("dataset `{dataset}`"),
            })?;

        match lookup {
            Lookup::Found => {
                info!("Found dataset `{dataset}`.");
                report.advance(SetupState::DatasetChecked);

                let lookup = self.gateway.lookup_table(&self.table).await.context(
                    error::ResourceLookupSnafu {
                        resource: format!("table `{}`", self.table),
                    },
                )?;
                match lookup {
                    Lookup::Found => info!("Found table `{}`.", self.table.table),
                    Lookup::NotFound => self.create_table(schema, report).await?,
                }
            }
            Lookup::NotFound => {
                info!(
                    location = %self.config.location,
                    "Creating dataset `{dataset}`."
                );
                self.gateway
                    .create_dataset(dataset, &self.config.location)
                    .await
                    .context(error::CreateResourceSnafu {
                        resource: format!("dataset `{dataset}`"),
                    })?;
                report.dataset_created = true;
                report.advance(SetupState::DatasetChecked);

                // A dataset that did not exist holds no tables.
                self.create_table(schema, report).await?;
            }
        }

        report.advance(SetupState::TableChecked);
        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema, report: &mut SetupReport) -> Result<()> {
        info!(columns = schema.len(), "Creating table `{}`.", self.table.table);
        self.gateway
            .create_table(&self.table, schema)
            .await
            .context(error::CreateResourceSnafu {
                resource: format!("table `{}`", self.table),
            })?;
        report.table_created = true;
        Ok(())
    }

    async fn load(&self, batch: &RowBatch, report: &mut SetupReport) -> Result<()> {
        if batch.is_empty() {
            info!("Data file holds no rows, nothing to insert.");
            report.advance(SetupState::DataLoaded);
            return Ok(());
        }

        let size = batch.estimated_size();
        let plan = ChunkPlan::new(batch.len(), size, self.config.max_payload);
        report.estimated_size = Some(size);
        report.chunks = plan.len();

        if plan.is_split() {
            info!(
                rows = batch.len(),
                estimated_size = size,
                step = plan.step(),
                "Splitting data into {} chunks.",
                plan.len()
            );
        } else {
            info!(
                rows = batch.len(),
                estimated_size = size,
                "Data smaller than payload, directly inserting into table."
            );
        }

        let chunks = plan.len();
        let skipped = chunks - plan.occupied_len();
        if skipped > 0 {
            debug!("Skipping {skipped} empty trailing chunks of {chunks}");
        }
        let inserts = plan.occupied().map(|(index, range)| async move {
            info!(rows = range.len(), "Working on chunk {}/{}...", index + 1, chunks);
            let result = self
                .gateway
                .insert_rows(&self.table, &batch.rows()[range])
                .await;
            (index, result)
        });

        let mut results = stream::iter(inserts).buffered(self.config.parallelism);
        while let Some((index, result)) = results.next().await {
            match result {
                Ok(inserted) => {
                    report.committed.push(index);
                    report.rows_inserted += inserted;
                }
                Err(e) => {
                    error!(
                        committed = ?report.committed,
                        "Chunk {}/{} failed: {e}",
                        index + 1,
                        chunks
                    );
                    return Err(e).context(error::RemoteInsertSnafu {
                        chunk: index,
                        chunks,
                        committed: report.committed.clone(),
                    });
                }
            }
        }

        info!(rows = report.rows_inserted, "Inserted all chunks.");
        report.advance(SetupState::DataLoaded);
        Ok(())
    }
}
