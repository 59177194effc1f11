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

//! Console logging for a setup run
//!
//! Nothing here installs a global subscriber. [`dispatch`] builds a
//! [`Dispatch`] that is handed to [`TableSetup`](crate::setup::TableSetup) or
//! attached to a future with `WithSubscriber`.

use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const SILENT_FILTER: &str = "error";

/// Verbosity settings of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Only errors are written
    pub silent: bool,
    /// `EnvFilter` directives, ignored when `silent` is set
    pub filter: Option<String>,
    pub ansi: bool,
}

impl LogConfig {
    /// Take the filter from `RUST_LOG`
    pub fn from_env(silent: bool) -> Self {
        Self {
            silent,
            filter: std::env::var(EnvFilter::DEFAULT_ENV).ok(),
            ansi: false,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        if self.silent {
            return EnvFilter::new(SILENT_FILTER);
        }
        self.filter
            .as_deref()
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Subscriber writing to stderr
pub fn dispatch(config: &LogConfig) -> Dispatch {
    dispatch_with_writer(config, std::io::stderr)
}

pub fn dispatch_with_writer<W>(config: &LogConfig, writer: W) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(false)
        .with_ansi(config.ansi)
        .with_writer(writer)
        .finish();
    Dispatch::new(subscriber)
}
