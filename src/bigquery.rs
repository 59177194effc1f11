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

use std::path::PathBuf;

use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::field_type::FieldType as BqFieldType;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_schema::TableSchema as BqTableSchema;
use gcp_bigquery_client::yup_oauth2;
use gcp_bigquery_client::Client;
use serde_json::Value;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::gateway::{Lookup, TableRef, WarehouseGateway};
use crate::schema::{FieldType, TableSchema};
use crate::{error, Result};

/// Environment variable holding the application default credentials file
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const HTTP_NOT_FOUND: i64 = 404;

/// Where the BigQuery client takes its credentials from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A service account key file
    ServiceAccountKey(PathBuf),
    /// Whatever the environment provides, see [`CREDENTIALS_ENV`]
    ApplicationDefault,
}

impl Credentials {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        path.map_or(Credentials::ApplicationDefault, Credentials::ServiceAccountKey)
    }
}

/// Gateway to the BigQuery REST API of one project
#[derive(Clone)]
pub struct BigQueryGateway {
    project_id: String,
    client: Client,
}

impl BigQueryGateway {
    /// Authenticate and bind to a project.
    ///
    /// When `project_id` is `None` the project of the service account key is
    /// used, either the one given explicitly or the one named by
    /// [`CREDENTIALS_ENV`].
    pub async fn connect(credentials: &Credentials, project_id: Option<String>) -> Result<Self> {
        match credentials {
            Credentials::ServiceAccountKey(path) => {
                let key = yup_oauth2::read_service_account_key(path)
                    .await
                    .context(error::ReadCredentialsSnafu { path })?;
                let project_id = project_id
                    .or_else(|| key.project_id.clone())
                    .context(error::MissingProjectIdSnafu)?;
                let client = Client::from_service_account_key(key, false)
                    .await
                    .context(error::AuthenticateSnafu)?;
                Ok(Self::new(project_id, client))
            }
            Credentials::ApplicationDefault => {
                let project_id = match project_id {
                    Some(project_id) => project_id,
                    None => ambient_project_id()
                        .await
                        .context(error::MissingProjectIdSnafu)?,
                };
                let client = Client::from_application_default_credentials()
                    .await
                    .context(error::AuthenticateSnafu)?;
                Ok(Self::new(project_id, client))
            }
        }
    }

    pub fn new(project_id: impl Into<String>, client: Client) -> Self {
        Self {
            project_id: project_id.into(),
            client,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl WarehouseGateway for BigQueryGateway {
    async fn lookup_dataset(&self, dataset: &str) -> Result<Lookup> {
        let result = self.client.dataset().get(&self.project_id, dataset).await;
        classify_lookup(result, "dataset lookup")
    }

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<()> {
        let _ = self
            .client
            .dataset()
            .create(Dataset::new(&self.project_id, dataset).location(location))
            .await
            .context(error::ApiSnafu {
                operation: "dataset creation",
            })?;
        Ok(())
    }

    async fn lookup_table(&self, table: &TableRef) -> Result<Lookup> {
        let result = self
            .client
            .table()
            .get(&self.project_id, &table.dataset, &table.table, None)
            .await;
        classify_lookup(result, "table lookup")
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        let definition = Table::new(
            &self.project_id,
            &table.dataset,
            &table.table,
            to_bigquery_schema(schema),
        );
        let _ = self
            .client
            .table()
            .create(definition)
            .await
            .context(error::ApiSnafu {
                operation: "table creation",
            })?;
        Ok(())
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> Result<usize> {
        let mut request = TableDataInsertAllRequest::new();
        for row in rows {
            request.add_row(None, row).context(error::ApiSnafu {
                operation: "row encoding",
            })?;
        }

        let response = self
            .client
            .tabledata()
            .insert_all(&self.project_id, &table.dataset, &table.table, request)
            .await
            .context(error::ApiSnafu {
                operation: "row insert",
            })?;

        if let Some(insert_errors) = response.insert_errors.filter(|e| !e.is_empty()) {
            for insert_error in &insert_errors {
                debug!(table = %table, error = ?insert_error, "Row rejected");
            }
            warn!(
                table = %table,
                rejected = insert_errors.len(),
                "Insert request rejected rows"
            );
            return error::RowsRejectedSnafu {
                rejected: insert_errors.len(),
            }
            .fail();
        }

        Ok(rows.len())
    }
}

/// Map a BigQuery lookup result, only an HTTP 404 counts as missing
fn classify_lookup<T>(
    result: std::result::Result<T, BQError>,
    operation: &'static str,
) -> Result<Lookup> {
    match result {
        Ok(_) => Ok(Lookup::Found),
        Err(e) if is_not_found(&e) => Ok(Lookup::NotFound),
        Err(e) => Err(e).context(error::ApiSnafu { operation }),
    }
}

fn is_not_found(err: &BQError) -> bool {
    matches!(err, BQError::ResponseError { error } if error.error.code == HTTP_NOT_FOUND)
}

async fn ambient_project_id() -> Option<String> {
    let path = std::env::var_os(CREDENTIALS_ENV)?;
    match yup_oauth2::read_service_account_key(&path).await {
        Ok(key) => key.project_id,
        Err(e) => {
            debug!(error = %e, "No project id in ambient credentials");
            None
        }
    }
}

pub fn to_bigquery_type(field_type: FieldType) -> BqFieldType {
    match field_type {
        FieldType::String => BqFieldType::String,
        FieldType::Bytes => BqFieldType::Bytes,
        FieldType::Integer => BqFieldType::Integer,
        FieldType::Float => BqFieldType::Float,
        FieldType::Numeric => BqFieldType::Numeric,
        FieldType::BigNumeric => BqFieldType::Bignumeric,
        FieldType::Boolean => BqFieldType::Boolean,
        FieldType::Timestamp => BqFieldType::Timestamp,
        FieldType::Date => BqFieldType::Date,
        FieldType::Time => BqFieldType::Time,
        FieldType::Datetime => BqFieldType::Datetime,
        FieldType::Geography => BqFieldType::Geography,
        FieldType::Json => BqFieldType::Json,
        FieldType::Record => BqFieldType::Record,
    }
}

/// Column definitions in table order as the BigQuery API expects them
pub fn to_bigquery_schema(schema: &TableSchema) -> BqTableSchema {
    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            let mut column = TableFieldSchema::new(&field.name, to_bigquery_type(field.field_type));
            column.mode = Some(field.mode.as_str().to_string());
            column.description = field.description.clone();
            column
        })
        .collect();
    BqTableSchema::new(fields)
}

#[cfg(test)]
mod tests {
    use gcp_bigquery_client::error::{NestedResponseError, ResponseError};

    use super::*;
    use crate::Error;

    fn response_error(code: i64, status: &str) -> BQError {
        BQError::ResponseError {
            error: ResponseError {
                error: NestedResponseError {
                    code,
                    errors: Vec::new(),
                    message: format!("{code} {status}"),
                    status: status.to_string(),
                },
            },
        }
    }

    #[test]
    fn test_only_not_found_is_missing() {
        let found = classify_lookup(Ok::<_, BQError>(()), "dataset lookup").unwrap();
        assert_eq!(found, Lookup::Found);

        let missing =
            classify_lookup::<()>(Err(response_error(404, "NOT_FOUND")), "dataset lookup").unwrap();
        assert_eq!(missing, Lookup::NotFound);

        for (code, status) in [(403, "PERMISSION_DENIED"), (500, "INTERNAL")] {
            let err = classify_lookup::<()>(Err(response_error(code, status)), "table lookup")
                .unwrap_err();
            match err {
                Error::Api { operation, .. } => assert_eq!(operation, "table lookup"),
                other => panic!("unexpected error {other:?}"),
            }
        }

        let err = classify_lookup::<()>(Err(BQError::NoDataAvailable), "table lookup").unwrap_err();
        assert!(matches!(err, Error::Api { .. }), "{err:?}");
        assert!(err.is_remote());
    }

    #[test]
    fn test_credentials_from_path() {
        assert_eq!(Credentials::from_path(None), Credentials::ApplicationDefault);
        assert_eq!(
            Credentials::from_path(Some(PathBuf::from("key.json"))),
            Credentials::ServiceAccountKey(PathBuf::from("key.json"))
        );
    }

    #[test]
    fn test_schema_conversion_keeps_order_and_modes() {
        let schema = TableSchema::from_json(
            r#"[
                {"name": "id", "type": "INT64", "mode": "REQUIRED"},
                {"name": "amount", "type": "BIGNUMERIC"},
                {"name": "labels", "type": "STRING", "mode": "REPEATED", "description": "free labels"}
            ]"#,
        )
        .unwrap();

        let converted = serde_json::to_value(to_bigquery_schema(&schema)).unwrap();
        let fields = converted["fields"].as_array().expect("fields");
        assert_eq!(fields.len(), 3);

        assert_eq!(fields[0]["name"], "id");
        assert_eq!(fields[0]["type"], "INTEGER");
        assert_eq!(fields[0]["mode"], "REQUIRED");

        assert_eq!(fields[1]["name"], "amount");
        assert_eq!(fields[1]["type"], "BIGNUMERIC");
        assert_eq!(fields[1]["mode"], "NULLABLE");

        assert_eq!(fields[2]["name"], "labels");
        assert_eq!(fields[2]["mode"], "REPEATED");
        assert_eq!(fields[2]["description"], "free labels");
    }
}
