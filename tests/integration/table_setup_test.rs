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

// End to end runs of the table setup against the in-memory warehouse

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bq_table_setup::error::{self, EXIT_CONFIG, EXIT_REMOTE};
use bq_table_setup::logging::{dispatch_with_writer, LogConfig};
use bq_table_setup::memory::Request;
use bq_table_setup::{
    ChunkPlan, Error, FieldSpec, FieldType, Lookup, MemoryGateway, Result, RowBatch, SetupConfig,
    SetupState, TableRef, TableSchema, TableSetup, WarehouseGateway,
};
use derive_new::new;
use parking_lot::Mutex;
use serde_json::{json, Value};

fn testdata(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/integration/testdata")
        .join(name)
}

fn orders() -> TableRef {
    TableRef::new("sales", "orders")
}

fn schema() -> TableSchema {
    TableSchema::from_path(testdata("schema.json")).expect("fixture schema")
}

fn numbered_rows(count: usize) -> RowBatch {
    let rows = (0..count)
        .map(|id| json!({"order_id": id, "customer": format!("customer-{id}")}))
        .collect::<Vec<_>>();
    RowBatch::from_value(Value::Array(rows)).expect("rows")
}

fn config(max_payload: usize, parallelism: usize) -> SetupConfig {
    SetupConfig::builder()
        .max_payload(max_payload)
        .parallelism(parallelism)
        .build()
        .expect("config")
}

/// Wraps a [`MemoryGateway`] and fails chosen requests
#[derive(new)]
struct ScriptedGateway {
    inner: MemoryGateway,
    #[new(default)]
    fail_dataset_lookup: bool,
    #[new(default)]
    fail_table_lookup: bool,
    #[new(default)]
    fail_insert_at: Option<usize>,
    #[new(default)]
    inserts: AtomicUsize,
}

impl ScriptedGateway {
    fn failing_dataset_lookup(mut self) -> Self {
        self.fail_dataset_lookup = true;
        self
    }

    fn failing_table_lookup(mut self) -> Self {
        self.fail_table_lookup = true;
        self
    }

    /// Fail the `n`th insert request, counting from 0
    fn failing_insert(mut self, n: usize) -> Self {
        self.fail_insert_at = Some(n);
        self
    }
}

impl WarehouseGateway for ScriptedGateway {
    async fn lookup_dataset(&self, dataset: &str) -> Result<Lookup> {
        if self.fail_dataset_lookup {
            return error::WarehouseSnafu {
                msg: "403 access denied",
            }
            .fail();
        }
        self.inner.lookup_dataset(dataset).await
    }

    async fn create_dataset(&self, dataset: &str, location: &str) -> Result<()> {
        self.inner.create_dataset(dataset, location).await
    }

    async fn lookup_table(&self, table: &TableRef) -> Result<Lookup> {
        if self.fail_table_lookup {
            return error::WarehouseSnafu {
                msg: "503 backend unavailable",
            }
            .fail();
        }
        self.inner.lookup_table(table).await
    }

    async fn create_table(&self, table: &TableRef, schema: &TableSchema) -> Result<()> {
        self.inner.create_table(table, schema).await
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Value]) -> Result<usize> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert_at == Some(n) {
            return error::WarehouseSnafu {
                msg: "500 internal error",
            }
            .fail();
        }
        self.inner.insert_rows(table, rows).await
    }
}

fn insert_requests(gateway: &MemoryGateway) -> Vec<usize> {
    gateway
        .requests()
        .into_iter()
        .filter_map(|request| match request {
            Request::Insert { rows, .. } => Some(rows),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_missing_dataset_creates_dataset_and_table() -> Result<()> {
    let gateway = MemoryGateway::new();
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup.run(&schema(), None).await?;

    assert_eq!(report.state, SetupState::Done);
    assert!(report.dataset_created);
    assert!(report.table_created);
    assert_eq!(report.estimated_size, None);
    assert_eq!(gateway.dataset_location("sales").as_deref(), Some("EU"));
    assert_eq!(gateway.table_schema(&orders()), Some(schema()));
    // No table lookup in a dataset that was just created.
    assert_eq!(
        gateway.requests(),
        vec![
            Request::LookupDataset("sales".to_string()),
            Request::CreateDataset {
                dataset: "sales".to_string(),
                location: "EU".to_string(),
            },
            Request::CreateTable(orders()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_existing_dataset_gets_missing_table() -> Result<()> {
    let gateway = MemoryGateway::new().with_dataset("sales", "US");
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup.run(&schema(), None).await?;

    assert!(!report.dataset_created);
    assert!(report.table_created);
    assert_eq!(gateway.dataset_location("sales").as_deref(), Some("US"));
    assert_eq!(
        gateway.requests(),
        vec![
            Request::LookupDataset("sales".to_string()),
            Request::LookupTable(orders()),
            Request::CreateTable(orders()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_existing_table_is_left_as_is() -> Result<()> {
    let existing = TableSchema::new(vec![FieldSpec::builder()
        .name("legacy_id")
        .field_type(FieldType::String)
        .build()
        .unwrap()])?;
    let gateway = MemoryGateway::new().with_table(orders(), existing.clone());
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup.run(&schema(), None).await?;

    assert!(!report.dataset_created);
    assert!(!report.table_created);
    assert_eq!(gateway.table_schema(&orders()), Some(existing));
    assert!(!gateway
        .requests()
        .iter()
        .any(|r| matches!(r, Request::CreateDataset { .. } | Request::CreateTable(_))));
    Ok(())
}

#[tokio::test]
async fn test_failed_dataset_lookup_creates_nothing() {
    let inner = MemoryGateway::new();
    let gateway = ScriptedGateway::new(inner.clone()).failing_dataset_lookup();
    let setup = TableSetup::new(gateway, orders(), SetupConfig::default());

    let err = setup.run(&schema(), None).await.unwrap_err();

    assert!(matches!(err, Error::ResourceLookup { .. }), "{err:?}");
    assert_eq!(err.exit_code(), EXIT_REMOTE);
    assert!(!inner.has_dataset("sales"));
    assert!(inner.requests().is_empty());
}

#[tokio::test]
async fn test_failed_table_lookup_creates_nothing() {
    let inner = MemoryGateway::new().with_dataset("sales", "EU");
    let gateway = ScriptedGateway::new(inner.clone()).failing_table_lookup();
    let setup = TableSetup::new(gateway, orders(), SetupConfig::default());

    let err = setup.run(&schema(), Some(&numbered_rows(3))).await.unwrap_err();

    assert!(matches!(err, Error::ResourceLookup { .. }), "{err:?}");
    assert!(inner.table_schema(&orders()).is_none());
    assert!(insert_requests(&inner).is_empty());
}

#[tokio::test]
async fn test_small_data_is_inserted_in_one_request() -> Result<()> {
    let gateway = MemoryGateway::new();
    let batch = RowBatch::from_path(testdata("rows.json"))?;
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup.run(&schema(), Some(&batch)).await?;

    assert_eq!(report.state, SetupState::Done);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.committed, vec![0]);
    assert_eq!(report.rows_inserted, 5);
    assert_eq!(report.estimated_size, Some(batch.estimated_size()));
    assert_eq!(insert_requests(&gateway), vec![5]);
    assert_eq!(gateway.rows(&orders()), batch.rows());
    Ok(())
}

#[tokio::test]
async fn test_large_data_is_split_in_order() -> Result<()> {
    let gateway = MemoryGateway::new();
    let batch = numbered_rows(40);
    let max_payload = batch.estimated_size() / 4;
    let plan = ChunkPlan::new(batch.len(), batch.estimated_size(), max_payload);
    assert!(plan.is_split());

    let setup = TableSetup::new(gateway.clone(), orders(), config(max_payload, 1));
    let report = setup.run(&schema(), Some(&batch)).await?;

    let expected = plan
        .occupied()
        .map(|(_, range)| range.len())
        .collect::<Vec<_>>();
    assert_eq!(report.chunks, plan.len());
    assert_eq!(insert_requests(&gateway), expected);
    assert_eq!(report.rows_inserted, 40);
    assert_eq!(gateway.rows(&orders()), batch.rows());
    Ok(())
}

#[tokio::test]
async fn test_empty_chunks_are_never_sent() -> Result<()> {
    let gateway = MemoryGateway::new();
    let batch = numbered_rows(3);
    // A quota far below the data size plans many more chunks than rows.
    let setup = TableSetup::new(gateway.clone(), orders(), config(1, 1));

    let report = setup.run(&schema(), Some(&batch)).await?;

    assert!(report.chunks > 3, "{report:?}");
    assert_eq!(report.committed, vec![0, 1, 2]);
    assert_eq!(insert_requests(&gateway), vec![1, 1, 1]);
    assert_eq!(gateway.rows(&orders()), batch.rows());
    Ok(())
}

#[tokio::test]
async fn test_empty_data_inserts_nothing() -> Result<()> {
    let gateway = MemoryGateway::new();
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup.run(&schema(), Some(&RowBatch::default())).await?;

    assert_eq!(report.state, SetupState::Done);
    assert_eq!(report.chunks, 0);
    assert!(insert_requests(&gateway).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_chunk_reports_committed_chunks() {
    let inner = MemoryGateway::new();
    let gateway = ScriptedGateway::new(inner.clone()).failing_insert(2);
    let batch = numbered_rows(8);
    let setup = TableSetup::new(gateway, orders(), config(1, 1));

    let err = setup.run(&schema(), Some(&batch)).await.unwrap_err();

    match &err {
        Error::RemoteInsert {
            chunk, committed, ..
        } => {
            assert_eq!(*chunk, 2);
            assert_eq!(committed, &vec![0, 1]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.exit_code(), EXIT_REMOTE);
    // Chunks after the failed one are not attempted.
    assert_eq!(inner.rows(&orders()), batch.rows()[..2]);
    assert_eq!(insert_requests(&inner), vec![1, 1]);
}

#[tokio::test]
async fn test_parallel_inserts_commit_every_chunk() -> Result<()> {
    let gateway = MemoryGateway::new();
    let batch = numbered_rows(12);
    let setup = TableSetup::new(gateway.clone(), orders(), config(1, 4));

    let report = setup.run(&schema(), Some(&batch)).await?;

    assert_eq!(report.committed, (0..12).collect::<Vec<_>>());
    assert_eq!(report.rows_inserted, 12);

    let mut stored = gateway
        .rows(&orders())
        .iter()
        .map(|row| row["order_id"].as_u64().unwrap())
        .collect::<Vec<_>>();
    stored.sort_unstable();
    assert_eq!(stored, (0..12).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn test_data_file_is_read_after_table_exists() {
    let gateway = MemoryGateway::new();
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let err = setup
        .run_with_data_file(&schema(), Some(&testdata("bad_rows.json")))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MalformedData { .. }), "{err:?}");
    assert_eq!(err.exit_code(), EXIT_CONFIG);
    assert!(gateway.table_schema(&orders()).is_some());
    assert!(insert_requests(&gateway).is_empty());

    let err = setup
        .run_with_data_file(&schema(), Some(&testdata("missing.json")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ReadFile { .. }), "{err:?}");
}

#[tokio::test]
async fn test_run_with_data_file() -> Result<()> {
    let gateway = MemoryGateway::new();
    let setup = TableSetup::new(gateway.clone(), orders(), SetupConfig::default());

    let report = setup
        .run_with_data_file(&schema(), Some(&testdata("rows.json")))
        .await?;

    assert_eq!(report.rows_inserted, 5);
    assert_eq!(gateway.rows(&orders())[2]["customer"], "linus");
    Ok(())
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

async fn logged_run(log: LogConfig, max_payload: usize) -> String {
    let buffer = Buffer::default();
    let writer = buffer.clone();
    let dispatch = dispatch_with_writer(&log, move || writer.clone());
    let setup = TableSetup::new(MemoryGateway::new(), orders(), config(max_payload, 1))
        .with_dispatch(dispatch);

    setup
        .run(&schema(), Some(&numbered_rows(4)))
        .await
        .expect("run");
    let output = buffer.0.lock().clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[tokio::test]
async fn test_progress_is_logged() {
    let output = logged_run(LogConfig::default(), 1).await;
    assert!(output.contains("Creating dataset `sales`."), "{output}");
    assert!(output.contains("Creating table `orders`."), "{output}");
    assert!(output.contains("Splitting data into"), "{output}");
    assert!(output.contains("Working on chunk 1/"), "{output}");
}

#[tokio::test]
async fn test_silent_run_logs_nothing() {
    let log = LogConfig {
        silent: true,
        ..Default::default()
    };
    let output = logged_run(log, 1).await;
    assert!(output.is_empty(), "{output}");
}
