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

//! Table schema definitions loaded from a flat JSON field list
//!
//! A schema file looks like:
//!
//! ```json
//! [
//!   {"name": "id", "type": "INTEGER", "mode": "REQUIRED"},
//!   {"name": "label", "type": "STRING"}
//! ]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use derive_builder::Builder;
use serde::Deserialize;
use snafu::{ensure, OptionExt, ResultExt};

use crate::{error, Result};

/// Column types accepted in a schema file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Numeric,
    BigNumeric,
    Boolean,
    Timestamp,
    Date,
    Time,
    Datetime,
    Geography,
    Json,
    // Recognised so that it can be rejected with a precise message.
    Record,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Numeric => "NUMERIC",
            FieldType::BigNumeric => "BIGNUMERIC",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::Datetime => "DATETIME",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
            FieldType::Record => "RECORD",
        }
    }

    /// Whether this type carries nested fields
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldType::Record)
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let field_type = match s.to_ascii_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "NUMERIC" => FieldType::Numeric,
            "BIGNUMERIC" => FieldType::BigNumeric,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "DATETIME" => FieldType::Datetime,
            "GEOGRAPHY" => FieldType::Geography,
            "JSON" => FieldType::Json,
            "RECORD" | "STRUCT" => FieldType::Record,
            _ => return Err(format!("unknown field type `{s}`")),
        };
        Ok(field_type)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column mode, `Nullable` when a schema entry omits it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldMode {
    #[default]
    Nullable,
    Required,
    Repeated,
}

impl FieldMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Required => "REQUIRED",
            FieldMode::Repeated => "REPEATED",
        }
    }
}

impl FromStr for FieldMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NULLABLE" => Ok(FieldMode::Nullable),
            "REQUIRED" => Ok(FieldMode::Required),
            "REPEATED" => Ok(FieldMode::Repeated),
            _ => Err(format!("unknown field mode `{s}`")),
        }
    }
}

impl fmt::Display for FieldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column definition
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(setter(into))]
pub struct FieldSpec {
    /// Column name
    pub name: String,
    /// Column type
    pub field_type: FieldType,
    /// Column mode
    #[builder(default)]
    pub mode: FieldMode,
    /// Free-form column description
    #[builder(default, setter(strip_option))]
    pub description: Option<String>,
}

impl FieldSpec {
    /// Create a new field builder
    pub fn builder() -> FieldSpecBuilder {
        FieldSpecBuilder::default()
    }
}

/// Ordered, immutable list of columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    fields: Vec<FieldSpec>,
}

impl TableSchema {
    /// Build a schema from already validated fields.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSchema` if two fields share a name or a field is nested.
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            ensure!(
                !field.field_type.is_nested(),
                error::MalformedSchemaSnafu {
                    msg: format!(
                        "field #{index} `{}` is a RECORD, nested fields are not supported",
                        field.name
                    ),
                }
            );
            ensure!(
                seen.insert(field.name.to_ascii_lowercase()),
                error::MalformedSchemaSnafu {
                    msg: format!("field #{index} duplicates column name `{}`", field.name),
                }
            );
        }
        Ok(Self { fields })
    }

    /// Parse a schema from the JSON text of a field list
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| {
            error::MalformedSchemaSnafu {
                msg: format!("expected a JSON list of fields, {e}"),
            }
            .build()
        })?;

        let fields = raw
            .into_iter()
            .enumerate()
            .map(|(index, entry)| parse_field(index, entry))
            .collect::<Result<Vec<_>>>()?;

        Self::new(fields)
    }

    /// Read and parse a schema file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).context(error::ReadFileSnafu { path })?;
        Self::from_json(&json)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in table order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// Shape of one schema entry as it appears on disk
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: Option<String>,
    #[serde(rename = "type")]
    field_type: Option<String>,
    mode: Option<String>,
    description: Option<String>,
    fields: Option<serde_json::Value>,
}

fn parse_field(index: usize, entry: serde_json::Value) -> Result<FieldSpec> {
    ensure!(
        entry.is_object(),
        error::MalformedSchemaSnafu {
            msg: format!("field #{index} is not an object"),
        }
    );
    let raw: RawField = serde_json::from_value(entry).map_err(|e| {
        error::MalformedSchemaSnafu {
            msg: format!("field #{index}: {e}"),
        }
        .build()
    })?;

    let name = raw.name.context(error::MalformedSchemaSnafu {
        msg: format!("field #{index} is missing `name`"),
    })?;
    ensure!(
        !name.is_empty(),
        error::MalformedSchemaSnafu {
            msg: format!("field #{index} has an empty `name`"),
        }
    );
    let field_type = raw.field_type.context(error::MalformedSchemaSnafu {
        msg: format!("field #{index} `{name}` is missing `type`"),
    })?;
    ensure!(
        raw.fields.is_none(),
        error::MalformedSchemaSnafu {
            msg: format!("field #{index} `{name}` has nested fields, which are not supported"),
        }
    );

    let field_type = field_type.parse::<FieldType>().map_err(|e| {
        error::MalformedSchemaSnafu {
            msg: format!("field #{index} `{name}`: {e}"),
        }
        .build()
    })?;
    let mode = match raw.mode {
        Some(mode) => mode.parse::<FieldMode>().map_err(|e| {
            error::MalformedSchemaSnafu {
                msg: format!("field #{index} `{name}`: {e}"),
            }
            .build()
        })?,
        None => FieldMode::default(),
    };

    Ok(FieldSpec {
        name,
        field_type,
        mode,
        description: raw.description,
    })
}
