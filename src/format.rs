//! Wire formats, requested response formats and the values calls return.

use polars::prelude::DataFrame;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Encoding of a response body on the wire (`respFormat`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Csv,
    Json,
    Parquet,
}

impl WireFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }

    /// File extension used for cached artifacts.
    pub const fn extension(self) -> &'static str {
        self.as_str()
    }

    pub(crate) fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller wants back from a call.
///
/// `Table` decodes into a [`DataFrame`]; the others hand back the body as
/// text (`Csv`), parsed JSON (`Json`) or raw bytes (`Parquet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResponseFormat {
    #[default]
    Table,
    Csv,
    Json,
    Parquet,
}

impl ResponseFormat {
    pub const ALL: [Self; 4] = [Self::Table, Self::Csv, Self::Json, Self::Parquet];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }

    pub const fn representation(self) -> Representation {
        match self {
            Self::Table => Representation::Table,
            Self::Csv => Representation::Text,
            Self::Json => Representation::Structured,
            Self::Parquet => Representation::Bytes,
        }
    }

    pub(crate) fn list(formats: &[Self]) -> String {
        formats
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" | "dataframe" => Ok(Self::Table),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            _ => Err(ValidationError::UnsupportedFormat {
                format: s.to_string(),
                supported: Self::list(&Self::ALL),
            }),
        }
    }
}

/// Shape of the value handed back after decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Table,
    Text,
    Bytes,
    Structured,
}

/// Result of a client call, tagged by representation.
#[derive(Debug, Clone)]
pub enum Output {
    Table(DataFrame),
    Text(String),
    Bytes(Vec<u8>),
    Structured(Value),
}

impl Output {
    pub const fn representation(&self) -> Representation {
        match self {
            Self::Table(_) => Representation::Table,
            Self::Text(_) => Representation::Text,
            Self::Bytes(_) => Representation::Bytes,
            Self::Structured(_) => Representation::Structured,
        }
    }

    pub fn as_table(&self) -> Option<&DataFrame> {
        match self {
            Self::Table(df) => Some(df),
            _ => None,
        }
    }

    pub fn into_table(self) -> Option<DataFrame> {
        match self {
            Self::Table(df) => Some(df),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_structured(self) -> Option<Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }
}
