#![allow(dead_code)]

use easydata::polars::prelude::*;
use easydata::{Client, ClientConfig, Error, HttpRequest, HttpResponse, Result, Transport};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const KEY: &str = "secret-key";

/// Transport that records requests and replays canned responses.
///
/// With an empty queue it keeps answering with the last response given.
#[derive(Debug, Default)]
pub struct MockTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    fallback: Mutex<Option<HttpResponse>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, content_type: &str, body: impl Into<Vec<u8>>) {
        let resp = HttpResponse {
            status,
            body: body.into(),
            content_type: Some(content_type.to_string()),
        };
        *self.fallback.lock().unwrap() = Some(resp.clone());
        self.responses.lock().unwrap().push_back(Ok(resp));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(Error::Network(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Network("no canned response".into()))
    }
}

pub fn client(transport: &Arc<MockTransport>, cache_dir: Option<&Path>) -> Client {
    let mut cfg = ClientConfig::new(KEY);
    cfg.url = "https://easydata.test/api/v3/".into();
    cfg.cache_dir = cache_dir.map(Path::to_path_buf);
    Client::with_transport(cfg, transport.clone())
}

pub fn query_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

pub fn header_value<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Time-series CSV with `rows` data rows.
pub fn series_csv(rows: usize) -> String {
    let mut out = String::from("date,NMS-EC_BUS,NMS-GA_BUS\n");
    for i in 0..rows {
        out.push_str(&format!("2020-{:02}-01,{}.5,{}\n", i % 12 + 1, i, i * 2));
    }
    out
}

pub fn grid_parquet() -> Vec<u8> {
    let mut df = df!(
        "d1" => ["TRD01-F_M", "TRD01-F_M", "TRD01-F_X"],
        "d3" => ["TRD01-R_FI", "TRD01-R_GA", "TRD01-R_FI"],
        "value" => [10.0, 11.5, 7.25],
    )
    .unwrap();
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut df).unwrap();
    buf
}

pub fn cache_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
