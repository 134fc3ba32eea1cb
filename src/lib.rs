//! A small Rust client for the Quantec EasyData API.
//!
//! The API serves two kinds of data: flat time series (by code or saved
//! selection) and multi-dimensional grid data addressed by recipe and
//! optional dimension filters. This crate validates parameters up front,
//! picks the HTTP method and wire format per call, caches expensive
//! responses on disk, and decodes bodies into a [`polars`] `DataFrame`,
//! text, bytes or JSON.
//!
//! ## Quick start
//! - Configure authentication via environment variables (`EASYDATA_API_KEY`,
//!   optionally `EASYDATA_API_URL` and `EASYDATA_CACHE_DIR`) or a
//!   `.easydatarc` file (current directory or home directory).
//! - Call one of [`Client::fetch_time_series`], [`Client::fetch_grid`],
//!   [`Client::list_selections`] or [`Client::list_recipes`].
//!
//! ```no_run
//! use easydata::{Client, FilterSpec, GridQuery, ResponseFormat, TimeSeriesQuery};
//!
//! fn main() -> easydata::Result<()> {
//!     let client = Client::from_env()?.with_cache("cache");
//!
//!     let series = client.fetch_time_series(
//!         &TimeSeriesQuery::codes("NMS-EC_BUS,NMS-GA_BUS")
//!             .freq("Q")
//!             .years("2020", "2023"),
//!     )?;
//!     println!("{:?}", series.as_table());
//!
//!     let grid = client.fetch_grid(
//!         &GridQuery::new(1066)
//!             .filter(FilterSpec::new("d1").codes(["TRD01-F_M"]))
//!             .filter(FilterSpec::new("d3").levels([2]))
//!             .format(ResponseFormat::Table),
//!     )?;
//!     println!("{:?}", grid.as_table());
//!     Ok(())
//! }
//! ```
//!
//! Logging goes through [`tracing`]; install a subscriber to see request
//! parameters and cache activity.

#![forbid(unsafe_code)]

mod cache;
mod client;
mod config;
mod discovery;
mod error;
mod filter;
mod format;
mod materialize;
mod request;
mod transport;
mod util;

pub use cache::{CacheEntry, CacheKey, CacheStore};
pub use client::Client;
pub use config::{ClientConfig, DEFAULT_CACHE_DIR, DEFAULT_URL};
pub use discovery::SelectionSummary;
pub use error::{Error, Result, ValidationError};
pub use filter::{Dimension, Expansion, Filter, FilterInput, FilterSpec, validate};
pub use format::{Output, Representation, ResponseFormat, WireFormat};
pub use materialize::materialize;
pub use request::{
    Endpoint, GridQuery, Method, PreparedCall, RequestSpec, STATUS_FLAGS, SelectionsQuery,
    TimeSeriesQuery, parse_status, prepare_recipes,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};

pub use polars;
