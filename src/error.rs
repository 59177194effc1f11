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

use std::io;
use std::path::PathBuf;

use gcp_bigquery_client::error::BQError;
use snafu::{Location, Snafu};

/// Process exit code for argument, configuration and input errors.
pub const EXIT_CONFIG: u8 = 1;
/// Process exit code for failures reported by the remote warehouse.
pub const EXIT_REMOTE: u8 = 2;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Failed to read {}, {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Malformed schema: {}", msg))]
    MalformedSchema {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Malformed data: {}", msg))]
    MalformedData {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Invalid configuration, {}", msg))]
    InvalidConfig {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "No project id given and none found in the credentials, pass --project or set GOOGLE_CLOUD_PROJECT"
    ))]
    MissingProjectId {
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to read service account key {}, {}", path.display(), source))]
    ReadCredentials {
        path: PathBuf,
        source: io::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to authenticate against BigQuery"))]
    Authenticate {
        source: BQError,
        #[snafu(implicit)]
        location: Location,
    },

    // Error returned by the BigQuery REST API or its transport.
    #[snafu(display("BigQuery {} failed: {}", operation, source))]
    Api {
        operation: &'static str,
        source: BQError,
        #[snafu(implicit)]
        location: Location,
    },

    // Failure raised by a gateway that is not backed by BigQuery.
    #[snafu(display("Warehouse request failed: {}", msg))]
    Warehouse {
        msg: String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("{} rows of the request were rejected by the warehouse", rejected))]
    RowsRejected {
        rejected: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to look up {}", resource))]
    ResourceLookup {
        resource: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Failed to create {}", resource))]
    CreateResource {
        resource: String,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "Failed to insert chunk {}/{}, chunks committed before the failure: {:?}",
        chunk + 1,
        chunks,
        committed
    ))]
    RemoteInsert {
        chunk: usize,
        chunks: usize,
        committed: Vec<usize>,
        #[snafu(source(from(Error, Box::new)))]
        source: Box<Error>,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Api { .. }
            | Self::Warehouse { .. }
            | Self::RowsRejected { .. }
            | Self::ResourceLookup { .. }
            | Self::CreateResource { .. }
            | Self::RemoteInsert { .. } => EXIT_REMOTE,
            _ => EXIT_CONFIG,
        }
    }

    /// Indicate if the error came back from the warehouse rather than from local input
    pub fn is_remote(&self) -> bool {
        self.exit_code() == EXIT_REMOTE
    }
}
