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

//! Command line surface

use std::path::PathBuf;

use clap::Parser;
use snafu::ensure;

use crate::bigquery::Credentials;
use crate::chunk::MAX_PAYLOAD;
use crate::gateway::TableRef;
use crate::logging::LogConfig;
use crate::setup::{SetupConfig, DEFAULT_LOCATION};
use crate::{error, Result};

/// Create a BigQuery dataset and table from a JSON schema and optionally load
/// JSON rows into it.
#[derive(Parser, Debug, Clone)]
#[command(name = "bq-table-setup", version)]
pub struct Args {
    /// Specifies the dataset name.
    pub dataset: String,

    /// Specifies the table name.
    pub table: String,

    /// Path to the table schema, a JSON list of `{"name", "type", "mode"}` fields.
    pub schema: PathBuf,

    /// Path to data in JSON format, an array of row objects.
    pub data: Option<PathBuf>,

    /// Path to a service account key file. When omitted the application default
    /// credentials are used, see GOOGLE_APPLICATION_CREDENTIALS.
    #[arg(long, short)]
    pub creds: Option<PathBuf>,

    /// No console output of current progress, only errors.
    #[arg(long, short)]
    pub silent: bool,

    /// Project owning the dataset. Defaults to the project of the credentials.
    #[arg(long, short, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: Option<String>,

    /// Location of the dataset if it has to be created.
    #[arg(long, env = "BQ_TABLE_SETUP_LOCATION", default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Byte quota of a single insert request.
    #[arg(long, default_value_t = MAX_PAYLOAD)]
    pub max_payload: usize,

    /// Number of chunk inserts allowed in flight at once. Above 1, the chunks
    /// reported as committed after a failure may leave out chunks that were in
    /// flight and still got written, so check the table before re-inserting.
    #[arg(long, default_value_t = 1)]
    pub parallelism: usize,

    /// Run against an in-memory warehouse, nothing is sent to BigQuery.
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn setup_config(&self) -> Result<SetupConfig> {
        SetupConfig::builder()
            .location(self.location.clone())
            .max_payload(self.max_payload)
            .parallelism(self.parallelism)
            .build()
            .map_err(|e| error::InvalidConfigSnafu { msg: e.to_string() }.build())
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::from_env(self.silent)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::from_path(self.creds.clone())
    }

    /// The target table, with both names checked
    pub fn table_ref(&self) -> Result<TableRef> {
        ensure!(
            is_valid_dataset_id(&self.dataset),
            error::InvalidConfigSnafu {
                msg: format!(
                    "dataset `{}` may only contain letters, digits and underscores",
                    self.dataset
                ),
            }
        );
        ensure!(
            !self.table.trim().is_empty(),
            error::InvalidConfigSnafu {
                msg: "table name must not be empty",
            }
        );
        Ok(TableRef::new(&self.dataset, &self.table))
    }
}

fn is_valid_dataset_id(dataset: &str) -> bool {
    !dataset.is_empty()
        && dataset.len() <= 1024
        && dataset
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
