//! Decoding response bodies into the representation a caller asked for.

use polars::prelude::*;
use serde_json::Value;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::format::{Output, Representation, WireFormat};

const PARQUET_MAGIC: &[u8] = b"PAR1";

/// Decodes `body` (encoded as `format`) into `representation`.
///
/// Fails with [`Error::Decode`] rather than returning partial data.
pub fn materialize(body: &[u8], format: WireFormat, representation: Representation) -> Result<Output> {
    let fail = |reason: String| Error::decode(format, body.len(), reason);

    match (format, representation) {
        (WireFormat::Csv, Representation::Text) => String::from_utf8(body.to_vec())
            .map(Output::Text)
            .map_err(|e| fail(format!("body is not UTF-8: {e}"))),
        (WireFormat::Csv, Representation::Table) => read_csv(body)
            .and_then(drop_null_columns)
            .map(Output::Table)
            .map_err(|e| fail(e.to_string())),
        (WireFormat::Json, Representation::Structured) => serde_json::from_slice(body)
            .map(Output::Structured)
            .map_err(|e| fail(e.to_string())),
        (WireFormat::Json, Representation::Table) => {
            let value: Value = serde_json::from_slice(body).map_err(|e| fail(e.to_string()))?;
            records_to_frame(&value).map(Output::Table).map_err(fail)
        }
        (WireFormat::Parquet, Representation::Bytes) => {
            if !looks_like_parquet(body) {
                return Err(fail("missing parquet magic bytes".into()));
            }
            Ok(Output::Bytes(body.to_vec()))
        }
        (WireFormat::Parquet, Representation::Table) => read_parquet(body)
            .and_then(drop_null_columns)
            .map(Output::Table)
            .map_err(|e| fail(e.to_string())),
        (format, representation) => Err(fail(format!(
            "{representation:?} is not available for {format} responses"
        ))),
    }
}

pub(crate) fn read_csv(body: &[u8]) -> PolarsResult<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .into_reader_with_file_handle(Cursor::new(body.to_vec()))
        .finish()
}

pub(crate) fn read_parquet(body: &[u8]) -> PolarsResult<DataFrame> {
    ParquetReader::new(Cursor::new(body.to_vec())).finish()
}

fn looks_like_parquet(body: &[u8]) -> bool {
    body.len() >= 2 * PARQUET_MAGIC.len()
        && body.starts_with(PARQUET_MAGIC)
        && body.ends_with(PARQUET_MAGIC)
}

/// Drops columns holding nothing but nulls.
pub(crate) fn drop_null_columns(df: DataFrame) -> PolarsResult<DataFrame> {
    let height = df.height();
    if height == 0 {
        return Ok(df);
    }
    let kept: Vec<Column> = df
        .get_columns()
        .iter()
        .filter(|c| c.null_count() < height)
        .cloned()
        .collect();
    if kept.len() == df.width() {
        return Ok(df);
    }
    DataFrame::new(kept)
}

/// Flattens a JSON array of objects into a frame.
///
/// Columns follow first-seen key order; missing keys and JSON nulls become
/// nulls. Each column takes the narrowest type its values fit: Int64,
/// Float64, Boolean, else String with nested values rendered as compact JSON.
pub(crate) fn records_to_frame(value: &Value) -> std::result::Result<DataFrame, String> {
    let rows = value
        .as_array()
        .ok_or_else(|| "expected a JSON array of objects".to_string())?;

    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        let obj = row
            .as_object()
            .ok_or_else(|| format!("expected an object, got {row}"))?;
        for key in obj.keys() {
            if !names.contains(&key.as_str()) {
                names.push(key);
            }
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .map(|name| {
            let cells: Vec<Option<&Value>> = rows
                .iter()
                .map(|row| row.get(*name).filter(|v| !v.is_null()))
                .collect();
            json_column(name, &cells)
        })
        .collect();

    DataFrame::new(columns)
        .and_then(drop_null_columns)
        .map_err(|e| e.to_string())
}

fn json_column(name: &str, cells: &[Option<&Value>]) -> Column {
    let present = || cells.iter().flatten();

    if present().all(|v| v.is_i64()) {
        let values: Vec<Option<i64>> = cells.iter().map(|c| c.and_then(Value::as_i64)).collect();
        return Column::new(name.into(), values);
    }
    if present().all(|v| v.is_number()) {
        let values: Vec<Option<f64>> = cells.iter().map(|c| c.and_then(Value::as_f64)).collect();
        return Column::new(name.into(), values);
    }
    if present().all(|v| v.is_boolean()) {
        let values: Vec<Option<bool>> = cells.iter().map(|c| c.and_then(Value::as_bool)).collect();
        return Column::new(name.into(), values);
    }
    let values: Vec<Option<String>> = cells.iter().map(|c| c.map(text_cell)).collect();
    Column::new(name.into(), values)
}

fn text_cell(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(df: &DataFrame) -> Vec<&str> {
        df.get_column_names().into_iter().map(|n| n.as_str()).collect()
    }

    fn parquet_bytes() -> Vec<u8> {
        let mut df = df!(
            "code" => ["A", "B", "C"],
            "value" => [1.0, 2.5, 4.0],
        )
        .unwrap();
        let mut buf = Vec::new();
        ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
        buf
    }

    #[test]
    fn csv_to_table_drops_empty_columns() {
        let body = b"code,value,empty\nA,1,\nB,2,\n";
        let out = materialize(body, WireFormat::Csv, Representation::Table).unwrap();
        let df = out.into_table().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(names(&df), ["code", "value"]);
    }

    #[test]
    fn csv_to_text_is_passthrough() {
        let body = b"code,value\nA,1\n";
        let out = materialize(body, WireFormat::Csv, Representation::Text).unwrap();
        assert_eq!(out.into_text().unwrap(), "code,value\nA,1\n");
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let err = materialize(&[0xff, 0xfe], WireFormat::Csv, Representation::Text).unwrap_err();
        assert!(matches!(err, Error::Decode { len: 2, format: WireFormat::Csv, .. }));
    }

    #[test]
    fn json_structured_and_flattened() {
        let body = serde_json::to_vec(&json!([
            {"id": 1, "name": "TRD01", "tags": ["a"]},
            {"id": 2, "name": "TRD02", "extra": null}
        ]))
        .unwrap();

        let value = materialize(&body, WireFormat::Json, Representation::Structured)
            .unwrap()
            .into_structured()
            .unwrap();
        assert_eq!(value[1]["name"], "TRD02");

        let df = materialize(&body, WireFormat::Json, Representation::Table)
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(names(&df), ["id", "name", "tags"]);
        assert_eq!(df.column("id").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("name").unwrap().dtype(), &DataType::String);
        let tags = df.column("tags").unwrap().str().unwrap();
        assert_eq!(tags.get(0), Some(r#"["a"]"#));
        assert_eq!(tags.get(1), None);
    }

    #[test]
    fn json_columns_keep_scalar_types() {
        let body = br#"[
            {"pk": 1066, "name": "TRD01", "active": true, "weight": 1, "mixed": 1},
            {"pk": 53, "name": "NAT01", "active": false, "weight": 2.5, "mixed": "x"},
            {"pk": 7, "name": null, "active": null, "weight": null, "mixed": {"a": 1}}
        ]"#;
        let df = materialize(body, WireFormat::Json, Representation::Table)
            .unwrap()
            .into_table()
            .unwrap();

        let dtype = |c: &str| df.column(c).unwrap().dtype().clone();
        assert_eq!(dtype("pk"), DataType::Int64);
        assert_eq!(dtype("name"), DataType::String);
        assert_eq!(dtype("active"), DataType::Boolean);
        assert_eq!(dtype("weight"), DataType::Float64);
        assert_eq!(dtype("mixed"), DataType::String);

        assert_eq!(df.column("pk").unwrap().i64().unwrap().get(0), Some(1066));
        assert_eq!(df.column("active").unwrap().bool().unwrap().get(2), None);
        assert_eq!(df.column("weight").unwrap().f64().unwrap().get(0), Some(1.0));
        let mixed = df.column("mixed").unwrap().str().unwrap();
        assert_eq!(mixed.get(0), Some("1"));
        assert_eq!(mixed.get(2), Some(r#"{"a":1}"#));
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let err = materialize(b"{nope", WireFormat::Json, Representation::Structured).unwrap_err();
        assert!(matches!(err, Error::Decode { len: 5, .. }));
        let err = materialize(b"{\"a\":1}", WireFormat::Json, Representation::Table).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn parquet_bytes_and_table() {
        let body = parquet_bytes();
        let raw = materialize(&body, WireFormat::Parquet, Representation::Bytes)
            .unwrap()
            .into_bytes()
            .unwrap();
        assert_eq!(raw, body);

        let df = materialize(&body, WireFormat::Parquet, Representation::Table)
            .unwrap()
            .into_table()
            .unwrap();
        assert_eq!(df.shape(), (3, 2));
    }

    #[test]
    fn html_instead_of_parquet_is_rejected() {
        let body = b"<html>login</html>";
        for repr in [Representation::Bytes, Representation::Table] {
            let err = materialize(body, WireFormat::Parquet, repr).unwrap_err();
            assert!(matches!(err, Error::Decode { format: WireFormat::Parquet, .. }));
        }
    }

    #[test]
    fn unsupported_pairs_fail() {
        let err = materialize(b"a", WireFormat::Csv, Representation::Bytes).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}
