//! Selections listing: the server's records reshaped into a flat summary.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::format::{Output, Representation, WireFormat};

#[derive(Debug, Deserialize)]
struct SelectionRecord {
    id: u64,
    title: String,
    #[serde(default)]
    timeseriescodes: Vec<Value>,
    is_owner: bool,
    owner: Owner,
    status: String,
    #[serde(default)]
    description: Option<String>,
    modified: String,
}

#[derive(Debug, Deserialize)]
struct Owner {
    username: String,
}

/// One saved selection, numbered from 1 in server order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionSummary {
    pub item: u32,
    pub pk: u64,
    pub title: String,
    pub code_count: u32,
    pub is_owner: bool,
    pub owner: String,
    pub status: String,
    pub description: String,
    pub modified: String,
}

pub(crate) fn parse_selections(body: &[u8]) -> Result<Vec<SelectionSummary>> {
    let fail = |e: serde_json::Error| Error::decode(WireFormat::Json, body.len(), e);
    // an empty body or `null` both mean "no selections"
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let records: Option<Vec<SelectionRecord>> = serde_json::from_slice(body).map_err(fail)?;

    Ok(records
        .unwrap_or_default()
        .into_iter()
        .zip(1..)
        .map(|(r, item)| SelectionSummary {
            item,
            pk: r.id,
            title: r.title,
            code_count: r.timeseriescodes.len() as u32,
            is_owner: r.is_owner,
            owner: r.owner.username,
            status: r.status,
            description: r.description.unwrap_or_default(),
            modified: r.modified,
        })
        .collect())
}

pub(crate) fn selections_frame(rows: &[SelectionSummary]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Column::new("item".into(), rows.iter().map(|r| r.item).collect::<Vec<_>>()),
        Column::new("pk".into(), rows.iter().map(|r| r.pk).collect::<Vec<_>>()),
        Column::new(
            "title".into(),
            rows.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "code_count".into(),
            rows.iter().map(|r| r.code_count).collect::<Vec<_>>(),
        ),
        Column::new(
            "is_owner".into(),
            rows.iter().map(|r| r.is_owner).collect::<Vec<_>>(),
        ),
        Column::new(
            "owner".into(),
            rows.iter().map(|r| r.owner.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "status".into(),
            rows.iter().map(|r| r.status.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "description".into(),
            rows.iter().map(|r| r.description.as_str()).collect::<Vec<_>>(),
        ),
        Column::new(
            "modified".into(),
            rows.iter().map(|r| r.modified.as_str()).collect::<Vec<_>>(),
        ),
    ])
}

/// Decodes a selections body into a table or `{"selections": [...]}`.
pub(crate) fn materialize_selections(body: &[u8], representation: Representation) -> Result<Output> {
    let rows = parse_selections(body)?;
    match representation {
        Representation::Table => selections_frame(&rows)
            .map(Output::Table)
            .map_err(|e| Error::decode(WireFormat::Json, body.len(), e)),
        Representation::Structured => Ok(Output::Structured(json!({ "selections": rows }))),
        other => Err(Error::decode(
            WireFormat::Json,
            body.len(),
            format!("{other:?} is not available for selections"),
        )),
    }
}
