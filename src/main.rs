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

use std::process::ExitCode;

use bq_table_setup::config::Args;
use bq_table_setup::error::EXIT_CONFIG;
use bq_table_setup::{
    logging, BigQueryGateway, MemoryGateway, Result, SetupReport, TableSchema, TableSetup,
};
use clap::Parser;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, Dispatch};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let dispatch = logging::dispatch(&args.log_config());
    let result = run(&args, dispatch.clone())
        .with_subscriber(dispatch.clone())
        .await;

    match result {
        Ok(report) => {
            tracing::dispatcher::with_default(&dispatch, || {
                info!(
                    dataset_created = report.dataset_created,
                    table_created = report.table_created,
                    chunks = report.chunks,
                    rows = report.rows_inserted,
                    "Done."
                );
            });
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            tracing::dispatcher::with_default(&dispatch, || {
                error!("{}", snafu::Report::from_error(e));
            });
            ExitCode::from(code)
        }
    }
}

async fn run(args: &Args, dispatch: Dispatch) -> Result<SetupReport> {
    let config = args.setup_config()?;
    let table = args.table_ref()?;
    let schema = TableSchema::from_path(&args.schema)?;
    info!(columns = schema.len(), "Loaded schema from {}.", args.schema.display());

    if args.dry_run {
        info!("Dry run, nothing is sent to BigQuery.");
        let setup = TableSetup::new(MemoryGateway::new(), table, config).with_dispatch(dispatch);
        return setup
            .run_with_data_file(&schema, args.data.as_deref())
            .await;
    }

    let gateway = BigQueryGateway::connect(&args.credentials(), args.project.clone()).await?;
    info!(project = gateway.project_id(), "Connected to BigQuery.");

    TableSetup::new(gateway, table, config)
        .with_dispatch(dispatch)
        .run_with_data_file(&schema, args.data.as_deref())
        .await
}
