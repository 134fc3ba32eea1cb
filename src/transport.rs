use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::io::Read;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::request::Method;

/// Bodies smaller than this never get a progress bar.
const PROGRESS_MIN_BYTES: u64 = 1 << 20;

/// Upper bound on buffer space reserved up front from `Content-Length`.
const PREALLOC_MAX_BYTES: u64 = 64 << 20;

/// A fully resolved HTTP request, credentials included.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// Executes one request synchronously.
///
/// Implementations report transport failures as [`Error::Network`] and
/// return every HTTP response, whatever its status.
pub trait Transport: fmt::Debug + Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    progress: bool,
}

impl HttpTransport {
    pub fn new(verify: bool, timeout: Duration) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("easydata-rs/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("easydata-rs")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(timeout);

        if !verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            progress: false,
        })
    }

    /// Shows a progress bar while reading large bodies.
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    fn read_body(&self, mut resp: Response) -> Result<Vec<u8>> {
        let total = resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let pb = match total {
            Some(total) if self.progress && total >= PROGRESS_MIN_BYTES => {
                let pb = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                ) {
                    pb.set_style(style.progress_chars("=>-"));
                }
                Some(pb)
            }
            _ => None,
        };

        let Some(pb) = pb else {
            return resp
                .bytes()
                .map(|b| b.to_vec())
                .map_err(|e| Error::Network(e.without_url().to_string()));
        };

        let mut out = Vec::with_capacity(initial_capacity(total));
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = resp
                .read(&mut buf)
                .map_err(|e| Error::Network(format!("download interrupted: {e}")))?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
            pb.inc(n as u64);
        }
        pb.finish_and_clear();
        Ok(out)
    }
}

fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length.unwrap_or(0).min(PREALLOC_MAX_BYTES) as usize
}

impl Transport for HttpTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut req = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        // without_url: the query string carries the API key
        let resp = req
            .send()
            .map_err(|e| Error::Network(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = self.read_body(resp)?;

        Ok(HttpResponse {
            status,
            body,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_and_without_tls_verification() {
        for verify in [true, false] {
            let t = HttpTransport::new(verify, Duration::from_secs(5)).unwrap();
            assert!(!t.progress);
            assert!(t.with_progress(true).progress);
        }
    }

    #[test]
    fn content_length_only_bounds_preallocation() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(4096)), 4096);
        assert_eq!(initial_capacity(Some(u64::MAX)), PREALLOC_MAX_BYTES as usize);
    }
}
