//! Turns logical calls into concrete HTTP requests.
//!
//! Everything here is pure: parameters are validated and normalized, the
//! wire format is picked, and for cacheable endpoints the cache key is
//! derived from the normalized parameters. Nothing touches the network.

use serde_json::{Value, json};

use crate::cache::CacheKey;
use crate::error::ValidationError;
use crate::filter::{Filter, FilterInput, FilterSpec, canonical_set, validate};
use crate::format::{Representation, ResponseFormat, WireFormat};
use crate::util::{is_year, query_bool, split_list};

/// Letters accepted in a selections `status` filter:
/// Unsaved, Private, Shared, Open, oWner.
pub const STATUS_FLAGS: [char; 5] = ['U', 'P', 'S', 'O', 'W'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    TimeSeries,
    Selections,
    Recipes,
    Grid,
}

impl Endpoint {
    pub const fn name(self) -> &'static str {
        match self {
            Self::TimeSeries => "time-series",
            Self::Selections => "selections",
            Self::Recipes => "recipes",
            Self::Grid => "grid",
        }
    }

    /// Response formats this endpoint can serve.
    pub const fn formats(self) -> &'static [ResponseFormat] {
        match self {
            Self::TimeSeries => &[ResponseFormat::Table, ResponseFormat::Csv, ResponseFormat::Json],
            Self::Selections | Self::Recipes => &[ResponseFormat::Table, ResponseFormat::Json],
            Self::Grid => &[
                ResponseFormat::Table,
                ResponseFormat::Csv,
                ResponseFormat::Parquet,
            ],
        }
    }

    /// Whether responses are stored in the local cache.
    pub const fn is_cacheable(self) -> bool {
        matches!(self, Self::TimeSeries | Self::Grid)
    }

    /// Wire format requested from the server for `format`.
    pub const fn wire_format(self, format: ResponseFormat) -> WireFormat {
        match (self, format) {
            (Self::Selections | Self::Recipes, _) => WireFormat::Json,
            (Self::TimeSeries, ResponseFormat::Table) => WireFormat::Csv,
            (Self::Grid, ResponseFormat::Table) => WireFormat::Parquet,
            (_, ResponseFormat::Csv) => WireFormat::Csv,
            (_, ResponseFormat::Json) => WireFormat::Json,
            (_, ResponseFormat::Parquet) => WireFormat::Parquet,
        }
    }

    pub fn check_format(self, format: ResponseFormat) -> Result<WireFormat, ValidationError> {
        if self.formats().contains(&format) {
            Ok(self.wire_format(format))
        } else {
            Err(ValidationError::UnsupportedFormat {
                format: format.as_str().to_string(),
                supported: ResponseFormat::list(self.formats()),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// One concrete request, minus base URL and credentials.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub format: WireFormat,
}

/// A validated call ready to hand to the transport.
#[derive(Debug, Clone)]
pub struct PreparedCall {
    pub endpoint: Endpoint,
    pub request: RequestSpec,
    pub representation: Representation,
    /// Present only for cacheable endpoints.
    pub cache_key: Option<CacheKey>,
}

/// Parameters for `download/` (flat time series).
///
/// Exactly one of `codes` (comma-separated) or `selection` must be set.
///
/// ```
/// use easydata::TimeSeriesQuery;
///
/// let q = TimeSeriesQuery::codes("NMS-EC_BUS,NMS-GA_BUS")
///     .freq("Q")
///     .years("2020", "2023");
/// assert_eq!(q.start_year.as_deref(), Some("2020"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesQuery {
    pub codes: Option<String>,
    pub selection: Option<u64>,
    pub freq: String,
    pub start_year: Option<String>,
    pub end_year: Option<String>,
    pub analysis: bool,
    pub format: ResponseFormat,
}

impl Default for TimeSeriesQuery {
    fn default() -> Self {
        Self {
            codes: None,
            selection: None,
            freq: "M".to_string(),
            start_year: None,
            end_year: None,
            analysis: false,
            format: ResponseFormat::Table,
        }
    }
}

impl TimeSeriesQuery {
    pub fn codes(codes: impl Into<String>) -> Self {
        Self {
            codes: Some(codes.into()),
            ..Self::default()
        }
    }

    pub fn selection(pk: u64) -> Self {
        Self {
            selection: Some(pk),
            ..Self::default()
        }
    }

    pub fn freq(mut self, freq: impl Into<String>) -> Self {
        self.freq = freq.into();
        self
    }

    pub fn years(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_year = Some(start.into());
        self.end_year = Some(end.into());
        self
    }

    pub fn start_year(mut self, year: impl Into<String>) -> Self {
        self.start_year = Some(year.into());
        self
    }

    pub fn end_year(mut self, year: impl Into<String>) -> Self {
        self.end_year = Some(year.into());
        self
    }

    pub fn analysis(mut self, analysis: bool) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn prepare(&self, tidy: bool) -> Result<PreparedCall, ValidationError> {
        let endpoint = Endpoint::TimeSeries;
        let wire = endpoint.check_format(self.format)?;

        let codes = self.codes.as_deref().map(split_list).filter(|c| !c.is_empty());
        let source = match (codes, self.selection) {
            (Some(codes), None) => Source::Codes(codes),
            (None, Some(pk)) => Source::Selection(pk),
            (Some(_), Some(_)) => {
                return Err(ValidationError::InvalidParameterCombination(
                    "provide either time-series codes or a selection, not both",
                ));
            }
            (None, None) => {
                return Err(ValidationError::InvalidParameterCombination(
                    "either time-series codes or a selection must be provided",
                ));
            }
        };

        let start = year("start_year", self.start_year.as_deref())?;
        let end = year("end_year", self.end_year.as_deref())?;
        if self.analysis && matches!(source, Source::Codes(_)) {
            return Err(ValidationError::AnalysisRequiresSelection);
        }
        let freq = normalize_freq(&self.freq)?;

        let mut query = vec![
            ("respFormat".to_string(), wire.as_str().to_string()),
            ("freqs".to_string(), freq.clone()),
        ];
        match &source {
            Source::Codes(codes) => query.push(("timeSeriesCodes".into(), codes.join(","))),
            Source::Selection(pk) => query.push(("selectionPk".into(), pk.to_string())),
        }
        if let Some(y) = start {
            query.push(("startYear".into(), y.to_string()));
        }
        if let Some(y) = end {
            query.push(("endYear".into(), y.to_string()));
        }
        query.push(("isTidy".into(), query_bool(tidy)));
        query.push(("analysis".into(), query_bool(self.analysis)));

        let source_key = match &source {
            Source::Codes(codes) => json!({ "codes": codes }),
            Source::Selection(pk) => json!({ "selection": pk }),
        };
        let key_params = json!({
            "source": source_key,
            "freq": freq,
            "start_year": start,
            "end_year": end,
            "analysis": self.analysis,
            "tidy": tidy,
        });

        Ok(PreparedCall {
            endpoint,
            request: RequestSpec {
                method: Method::Get,
                path: "download/".to_string(),
                query,
                body: None,
                format: wire,
            },
            representation: self.format.representation(),
            cache_key: endpoint
                .is_cacheable()
                .then(|| CacheKey::derive(endpoint, wire, &key_params)),
        })
    }
}

enum Source {
    Codes(Vec<String>),
    Selection(u64),
}

/// Parameters for `selections/`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionsQuery {
    /// Combination of [`STATUS_FLAGS`], e.g. `"PSO"`.
    pub status: Option<String>,
    pub show: Option<String>,
    pub filter: Option<String>,
    pub format: ResponseFormat,
}

impl SelectionsQuery {
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn show(mut self, show: impl Into<String>) -> Self {
        self.show = Some(show.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn prepare(&self) -> Result<PreparedCall, ValidationError> {
        let endpoint = Endpoint::Selections;
        let wire = endpoint.check_format(self.format)?;

        let mut query = vec![("format".to_string(), wire.as_str().to_string())];
        if let Some(status) = self.status.as_deref() {
            let flags = parse_status(status)?;
            if !flags.is_empty() {
                query.push(("status".into(), flags));
            }
        }
        for (name, value) in [("show", &self.show), ("filter", &self.filter)] {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                query.push((name.into(), v.to_string()));
            }
        }

        Ok(PreparedCall {
            endpoint,
            request: RequestSpec {
                method: Method::Get,
                path: "selections/".to_string(),
                query,
                body: None,
                format: wire,
            },
            representation: self.format.representation(),
            cache_key: None,
        })
    }
}

pub fn prepare_recipes(format: ResponseFormat) -> Result<PreparedCall, ValidationError> {
    let endpoint = Endpoint::Recipes;
    let wire = endpoint.check_format(format)?;
    Ok(PreparedCall {
        endpoint,
        request: RequestSpec {
            method: Method::Get,
            path: "recipes/".to_string(),
            query: Vec::new(),
            body: None,
            format: wire,
        },
        representation: format.representation(),
        cache_key: None,
    })
}

/// Parameters for `download/recipes/{recipe}/` (grid data).
///
/// ```
/// use easydata::{FilterSpec, GridQuery};
///
/// let q = GridQuery::new(1066)
///     .filter(FilterSpec::new("d1").codes(["TRD01-F_M"]))
///     .filter(FilterSpec::new("d3").levels([2]));
/// assert!(q.filters.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridQuery {
    pub recipe: u64,
    pub filters: Option<FilterInput>,
    pub expanded: bool,
    pub melted: bool,
    pub freq: Option<String>,
    pub format: ResponseFormat,
}

impl GridQuery {
    pub fn new(recipe: u64) -> Self {
        Self {
            recipe,
            filters: None,
            expanded: true,
            melted: true,
            freq: None,
            format: ResponseFormat::Table,
        }
    }

    /// Appends one filter.
    pub fn filter(mut self, spec: FilterSpec) -> Self {
        self.filters = Some(match self.filters.take() {
            None => FilterInput::One(spec),
            Some(FilterInput::One(first)) => FilterInput::Many(vec![first, spec]),
            Some(FilterInput::Many(mut all)) => {
                all.push(spec);
                FilterInput::Many(all)
            }
        });
        self
    }

    /// Replaces the filters.
    pub fn filters(mut self, filters: impl Into<FilterInput>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn expanded(mut self, expanded: bool) -> Self {
        self.expanded = expanded;
        self
    }

    pub fn melted(mut self, melted: bool) -> Self {
        self.melted = melted;
        self
    }

    pub fn freq(mut self, freq: impl Into<String>) -> Self {
        self.freq = Some(freq.into());
        self
    }

    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    pub fn prepare(&self) -> Result<PreparedCall, ValidationError> {
        let endpoint = Endpoint::Grid;
        let wire = endpoint.check_format(self.format)?;
        let filters: Vec<Filter> = match &self.filters {
            Some(input) => validate(input.clone())?,
            None => Vec::new(),
        };
        let freq = self.freq.as_deref().map(normalize_freq).transpose()?;
        let path = format!("download/recipes/{}/", self.recipe);

        let request = if filters.is_empty() {
            let mut query = vec![
                ("respFormat".to_string(), wire.as_str().to_string()),
                ("isExpanded".to_string(), query_bool(self.expanded)),
                ("isMelted".to_string(), query_bool(self.melted)),
            ];
            if let Some(f) = &freq {
                query.push(("freqs".into(), f.clone()));
            }
            RequestSpec {
                method: Method::Get,
                path,
                query,
                body: None,
                format: wire,
            }
        } else {
            let mut body = json!({
                "respFormat": wire.as_str(),
                "isExpanded": self.expanded,
                "isMelted": self.melted,
                "selectdimensionnodes": filters,
            });
            if let Some(f) = &freq {
                body["freqs"] = json!(f);
            }
            RequestSpec {
                method: Method::Post,
                path,
                query: Vec::new(),
                body: Some(body),
                format: wire,
            }
        };

        let key_params = json!({
            "recipe": self.recipe,
            "expanded": self.expanded,
            "melted": self.melted,
            "freq": freq,
            "filters": canonical_set(&filters),
        });

        Ok(PreparedCall {
            endpoint,
            request,
            representation: self.format.representation(),
            cache_key: endpoint
                .is_cacheable()
                .then(|| CacheKey::derive(endpoint, wire, &key_params)),
        })
    }
}

fn year<'a>(field: &'static str, value: Option<&'a str>) -> Result<Option<&'a str>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if is_year(v) => Ok(Some(v)),
        Some(v) => Err(ValidationError::InvalidDateFormat {
            field,
            value: v.to_string(),
        }),
    }
}

fn normalize_freq(freq: &str) -> Result<String, ValidationError> {
    let freq = freq.trim().to_ascii_uppercase();
    if freq.is_empty() {
        return Err(ValidationError::InvalidFrequency);
    }
    Ok(freq)
}

/// Upper-cases and de-duplicates status flags, rejecting unknown letters.
pub fn parse_status(status: &str) -> Result<String, ValidationError> {
    let mut out = String::new();
    for c in status.trim().chars() {
        let flag = c.to_ascii_uppercase();
        if !STATUS_FLAGS.contains(&flag) {
            return Err(ValidationError::InvalidStatusFlag(c));
        }
        if !out.contains(flag) {
            out.push(flag);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(call: &'a PreparedCall, name: &str) -> Option<&'a str> {
        call.request
            .query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn time_series_codes_query() {
        let call = TimeSeriesQuery::codes("A, B")
            .freq("q")
            .years("2020", "2023")
            .prepare(true)
            .unwrap();
        assert_eq!(call.request.method, Method::Get);
        assert_eq!(call.request.path, "download/");
        assert_eq!(param(&call, "timeSeriesCodes"), Some("A,B"));
        assert_eq!(param(&call, "freqs"), Some("Q"));
        assert_eq!(param(&call, "startYear"), Some("2020"));
        assert_eq!(param(&call, "endYear"), Some("2023"));
        assert_eq!(param(&call, "respFormat"), Some("csv"));
        assert_eq!(param(&call, "isTidy"), Some("True"));
        assert_eq!(param(&call, "selectionPk"), None);
        assert!(call.cache_key.is_some());
    }

    #[test]
    fn time_series_selection_with_analysis() {
        let call = TimeSeriesQuery::selection(42).analysis(true).prepare(false).unwrap();
        assert_eq!(param(&call, "selectionPk"), Some("42"));
        assert_eq!(param(&call, "analysis"), Some("True"));
        assert_eq!(param(&call, "startYear"), None);
    }

    #[test]
    fn time_series_rejects_bad_combinations() {
        let neither = TimeSeriesQuery::default().prepare(true).unwrap_err();
        assert!(matches!(neither, ValidationError::InvalidParameterCombination(_)));

        let mut both = TimeSeriesQuery::codes("A");
        both.selection = Some(1);
        assert!(matches!(
            both.prepare(true).unwrap_err(),
            ValidationError::InvalidParameterCombination(_)
        ));

        assert!(matches!(
            TimeSeriesQuery::codes(" , ").prepare(true).unwrap_err(),
            ValidationError::InvalidParameterCombination(_)
        ));

        assert_eq!(
            TimeSeriesQuery::codes("A").analysis(true).prepare(true).unwrap_err(),
            ValidationError::AnalysisRequiresSelection
        );
    }

    #[test]
    fn time_series_rejects_full_dates() {
        let err = TimeSeriesQuery::codes("A")
            .start_year("2020-01-01")
            .prepare(true)
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidDateFormat {
                field: "start_year",
                value: "2020-01-01".into()
            }
        );
    }

    #[test]
    fn time_series_rejects_parquet() {
        let err = TimeSeriesQuery::codes("A")
            .format(ResponseFormat::Parquet)
            .prepare(true)
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedFormat { .. }));
    }

    #[test]
    fn representation_does_not_change_key() {
        let table = TimeSeriesQuery::codes("A").prepare(true).unwrap();
        let text = TimeSeriesQuery::codes("A")
            .format(ResponseFormat::Csv)
            .prepare(true)
            .unwrap();
        let json = TimeSeriesQuery::codes("A")
            .format(ResponseFormat::Json)
            .prepare(true)
            .unwrap();
        assert_eq!(table.cache_key, text.cache_key);
        assert_ne!(table.cache_key, json.cache_key);
        assert_eq!(text.representation, Representation::Text);
    }

    #[test]
    fn freq_casing_does_not_change_key() {
        let a = TimeSeriesQuery::codes("A").freq("q").prepare(true).unwrap();
        let b = TimeSeriesQuery::codes("A").freq("Q").prepare(true).unwrap();
        assert_eq!(a.cache_key, b.cache_key);
    }

    #[test]
    fn selections_status_flags() {
        let call = SelectionsQuery::default()
            .status("pso")
            .show("shared")
            .prepare()
            .unwrap();
        assert_eq!(param(&call, "status"), Some("PSO"));
        assert_eq!(param(&call, "show"), Some("shared"));
        assert_eq!(param(&call, "format"), Some("json"));
        assert!(call.cache_key.is_none());

        assert_eq!(parse_status("X"), Err(ValidationError::InvalidStatusFlag('X')));
        assert_eq!(parse_status("SSW").unwrap(), "SW");
    }

    #[test]
    fn recipes_reject_csv() {
        assert!(prepare_recipes(ResponseFormat::Table).is_ok());
        assert!(matches!(
            prepare_recipes(ResponseFormat::Csv).unwrap_err(),
            ValidationError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn grid_without_filters_is_get() {
        let call = GridQuery::new(1066).expanded(false).prepare().unwrap();
        assert_eq!(call.request.method, Method::Get);
        assert_eq!(call.request.path, "download/recipes/1066/");
        assert_eq!(param(&call, "respFormat"), Some("parquet"));
        assert_eq!(param(&call, "isExpanded"), Some("False"));
        assert_eq!(param(&call, "isMelted"), Some("True"));
        assert!(call.request.body.is_none());
    }

    #[test]
    fn grid_with_filters_is_post() {
        let call = GridQuery::new(53)
            .filter(FilterSpec::new("d3").levels([1]).codes(["X"]))
            .format(ResponseFormat::Csv)
            .prepare()
            .unwrap();
        assert_eq!(call.request.method, Method::Post);
        assert!(call.request.query.is_empty());
        let body = call.request.body.unwrap();
        assert_eq!(body["respFormat"], "csv");
        assert_eq!(body["isExpanded"], true);
        let nodes = body["selectdimensionnodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0]["dimension"], "d3");
        assert_eq!(nodes[0]["codes"], json!(["X"]));
        assert_eq!(nodes[0]["levels"], json!([1]));
    }

    #[test]
    fn grid_freq_is_normalized_and_sent() {
        let get = GridQuery::new(1066).freq(" q ").prepare().unwrap();
        assert_eq!(param(&get, "freqs"), Some("Q"));

        let post = GridQuery::new(1066)
            .freq("a")
            .filter(FilterSpec::new("d1").codes(["X"]))
            .prepare()
            .unwrap();
        assert_eq!(post.request.body.unwrap()["freqs"], "A");

        let unfiltered = GridQuery::new(1066).prepare().unwrap();
        assert_eq!(param(&unfiltered, "freqs"), None);
    }

    #[test]
    fn grid_rejects_empty_freq() {
        assert_eq!(
            GridQuery::new(1066).freq("  ").prepare().unwrap_err(),
            ValidationError::InvalidFrequency
        );
    }

    #[test]
    fn grid_freq_changes_key() {
        let none = GridQuery::new(7).prepare().unwrap();
        let lower = GridQuery::new(7).freq("q").prepare().unwrap();
        let upper = GridQuery::new(7).freq("Q").prepare().unwrap();
        let annual = GridQuery::new(7).freq("A").prepare().unwrap();
        assert_eq!(lower.cache_key, upper.cache_key);
        assert_ne!(none.cache_key, upper.cache_key);
        assert_ne!(annual.cache_key, upper.cache_key);
    }

    #[test]
    fn tidy_changes_time_series_key() {
        let tidy = TimeSeriesQuery::codes("A").prepare(true).unwrap();
        let wide = TimeSeriesQuery::codes("A").prepare(false).unwrap();
        assert_eq!(param(&wide, "isTidy"), Some("False"));
        assert_ne!(tidy.cache_key, wide.cache_key);
    }

    #[test]
    fn grid_key_ignores_filter_order_and_representation() {
        let a = GridQuery::new(7)
            .filter(FilterSpec::new("d1").codes(["B", "A"]))
            .filter(FilterSpec::new("d3").levels([2]))
            .prepare()
            .unwrap();
        let b = GridQuery::new(7)
            .filter(FilterSpec::new("d3").levels([2]))
            .filter(FilterSpec::new("D1").codes(["A", "B"]))
            .format(ResponseFormat::Parquet)
            .prepare()
            .unwrap();
        assert_eq!(a.cache_key, b.cache_key);

        let c = GridQuery::new(7).melted(false).prepare().unwrap();
        let d = GridQuery::new(7).prepare().unwrap();
        assert_ne!(c.cache_key, d.cache_key);
    }

    #[test]
    fn grid_rejects_json_and_bad_filters() {
        assert!(matches!(
            GridQuery::new(1).format(ResponseFormat::Json).prepare().unwrap_err(),
            ValidationError::UnsupportedFormat { .. }
        ));
        assert!(matches!(
            GridQuery::new(1)
                .filter(FilterSpec::new("invalid").levels([1]))
                .prepare()
                .unwrap_err(),
            ValidationError::InvalidDimension(_)
        ));
    }
}
