use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::config::{ClientConfig, load_config};
use crate::discovery::materialize_selections;
use crate::error::{Error, Result, api_error};
use crate::format::{Output, ResponseFormat};
use crate::materialize::materialize;
use crate::request::{
    GridQuery, Method, PreparedCall, RequestSpec, SelectionsQuery, TimeSeriesQuery,
    prepare_recipes,
};
use crate::transport::{HttpRequest, HttpTransport, Transport};
use crate::util::urljoin;

/// Synchronous EasyData client.
///
/// Cheap to clone; clones share the transport and cache directory.
#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    key: String,
    tidy: bool,
    cache: CacheStore,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Creates a client using environment variables and/or `.easydatarc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`key` arguments
    /// - environment variables `EASYDATA_API_URL` / `EASYDATA_API_KEY`
    /// - config file from `EASYDATA_RC` or `.easydatarc`
    pub fn new(url: Option<String>, key: Option<String>, verify: Option<bool>) -> Result<Self> {
        let cfg = load_config(url, key, verify).map_err(Error::Config)?;
        Self::with_config(cfg)
    }

    /// Creates a client over HTTP from an explicit configuration.
    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(cfg.verify, cfg.timeout)?.with_progress(cfg.progress);
        Ok(Self::with_transport(cfg, Arc::new(transport)))
    }

    /// Creates a client that sends requests through `transport`.
    pub fn with_transport(cfg: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let cache = match cfg.cache_dir {
            Some(dir) => CacheStore::new(dir),
            None => CacheStore::disabled(),
        };
        Self {
            url: cfg.url.trim_end_matches('/').to_string(),
            key: cfg.key,
            tidy: cfg.tidy,
            cache,
            transport,
        }
    }

    pub fn with_cache(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache = CacheStore::new(dir);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = CacheStore::disabled();
        self
    }

    pub fn with_tidy(mut self, tidy: bool) -> Self {
        self.tidy = tidy;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Fetches flat time series by codes or by saved selection.
    ///
    /// Responses are cached when the client has a cache directory.
    pub fn fetch_time_series(&self, query: &TimeSeriesQuery) -> Result<Output> {
        let call = query.prepare(self.tidy)?;
        let label = match (&query.codes, query.selection) {
            (_, Some(pk)) => format!("selection {pk}"),
            (Some(codes), None) => codes.clone(),
            (None, None) => String::new(),
        };
        self.run_cached(call, &label)
    }

    /// Lists the user's saved selections.
    pub fn list_selections(&self, query: &SelectionsQuery) -> Result<Output> {
        let call = query.prepare()?;
        let body = self.send(&call.request)?;
        let out = materialize_selections(&body, call.representation)?;
        debug!(rows = rows(&out), "fetched selections");
        Ok(out)
    }

    /// Lists the recipes available for grid downloads.
    pub fn list_recipes(&self, format: ResponseFormat) -> Result<Output> {
        let call = prepare_recipes(format)?;
        let body = self.send(&call.request)?;
        let out = materialize(&body, call.request.format, call.representation)?;
        debug!(rows = rows(&out), "fetched recipes");
        Ok(out)
    }

    /// Fetches grid (pivot) data for a recipe, optionally filtered by dimension.
    ///
    /// Unfiltered requests are sent as GET; filtered ones are POSTed with the
    /// validated filters in the body. Responses are cached.
    pub fn fetch_grid(&self, query: &GridQuery) -> Result<Output> {
        let call = query.prepare()?;
        self.run_cached(call, &format!("recipe {}", query.recipe))
    }

    /// Deletes every cached response and returns how many files were removed.
    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    fn run_cached(&self, call: PreparedCall, label: &str) -> Result<Output> {
        if let Some(key) = &call.cache_key {
            if let Some(entry) = self.cache.get(key) {
                match materialize(&entry.payload, entry.format, call.representation) {
                    Ok(out) => {
                        debug!("[{label}] -- Loaded from cache ({} rows)", rows(&out));
                        return Ok(out);
                    }
                    Err(e) => {
                        warn!(key = key.digest(), error = %e, "[{label}] -- unreadable cache entry, refetching");
                    }
                }
            }
        }

        let body = self.send(&call.request)?;
        let out = materialize(&body, call.request.format, call.representation)?;

        if let Some(key) = &call.cache_key {
            self.cache.put(
                key,
                &CacheEntry {
                    format: call.request.format,
                    payload: body,
                },
            );
        }

        debug!("[{label}] -- Found {} rows", rows(&out));
        Ok(out)
    }

    fn send(&self, spec: &RequestSpec) -> Result<Vec<u8>> {
        let url = urljoin(&self.url, &spec.path);
        debug!(
            method = spec.method.as_str(),
            url = %url,
            query = ?spec.query,
            filtered = spec.body.is_some(),
            "sending request"
        );

        let request = self.apply_auth(HttpRequest {
            method: spec.method,
            url: url.clone(),
            query: spec.query.clone(),
            headers: Vec::new(),
            body: spec.body.clone(),
        });

        let resp = self.transport.execute(&request)?;
        if !(200..300).contains(&resp.status) {
            return Err(api_error(resp.status, &url, &resp.body));
        }
        if let Some(ct) = resp.content_type.as_deref() {
            if ct.to_ascii_lowercase().starts_with("text/html") {
                return Err(Error::decode(
                    spec.format,
                    resp.body.len(),
                    format!("expected {} but server sent {ct}", spec.format),
                ));
            }
        }
        Ok(resp.body)
    }

    fn apply_auth(&self, mut req: HttpRequest) -> HttpRequest {
        match req.method {
            Method::Get => req.query.push(("auth_token".into(), self.key.clone())),
            Method::Post => req
                .headers
                .push(("Authorization".into(), format!("Token {}", self.key.trim()))),
        }
        req
    }
}

fn rows(out: &Output) -> usize {
    match out {
        Output::Table(df) => df.height(),
        Output::Structured(v) => v
            .as_array()
            .or_else(|| v.get("selections").and_then(|s| s.as_array()))
            .map_or(1, Vec::len),
        Output::Text(s) => s.lines().count().saturating_sub(1),
        Output::Bytes(_) => 0,
    }
}

