//! Dimension filters for grid queries.
//!
//! Callers describe filters with [`FilterSpec`] (the loose shape the API
//! accepts as JSON) and [`validate`] turns one or many of them into
//! [`Filter`]s whose invariants hold by construction:
//!
//! | codes | levels | expansion                 |
//! |-------|--------|---------------------------|
//! | 1+    | -      | none                      |
//! | -     | 1+     | none                      |
//! | 1+    | 1+     | none                      |
//! | 1     | -      | children                  |
//! | 1     | -      | children including self   |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// One grid axis. The API numbers them `d1`..`d7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
}

impl Dimension {
    pub const ALL: [Self; 7] = [
        Self::D1,
        Self::D2,
        Self::D3,
        Self::D4,
        Self::D5,
        Self::D6,
        Self::D7,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::D1 => "d1",
            Self::D2 => "d2",
            Self::D3 => "d3",
            Self::D4 => "d4",
            Self::D5 => "d5",
            Self::D6 => "d6",
            Self::D7 => "d7",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == tag)
            .ok_or_else(|| ValidationError::InvalidDimension(s.to_string()))
    }
}

/// How a single-code filter expands into the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Expansion {
    #[default]
    None,
    Children,
    ChildrenIncludeSelf,
}

/// Unvalidated filter, shaped like the API's `selectdimensionnodes` entries.
///
/// ```
/// use easydata::FilterSpec;
///
/// let spec = FilterSpec::new("d3").codes(["TRD01-R_FI"]).levels([1]);
/// assert_eq!(spec.dimension, "d3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSpec {
    pub dimension: String,
    #[serde(default)]
    pub levels: Vec<u32>,
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub children: bool,
    #[serde(default)]
    pub children_include_self: bool,
}

impl FilterSpec {
    pub fn new(dimension: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            ..Self::default()
        }
    }

    pub fn codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.codes.extend(codes.into_iter().map(Into::into));
        self
    }

    pub fn levels(mut self, levels: impl IntoIterator<Item = u32>) -> Self {
        self.levels.extend(levels);
        self
    }

    pub fn children(mut self) -> Self {
        self.children = true;
        self
    }

    pub fn children_include_self(mut self) -> Self {
        self.children_include_self = true;
        self
    }
}

/// A single filter or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterInput {
    One(FilterSpec),
    Many(Vec<FilterSpec>),
}

impl From<FilterSpec> for FilterInput {
    fn from(spec: FilterSpec) -> Self {
        Self::One(spec)
    }
}

impl From<Vec<FilterSpec>> for FilterInput {
    fn from(specs: Vec<FilterSpec>) -> Self {
        Self::Many(specs)
    }
}

impl From<Vec<Filter>> for FilterInput {
    fn from(filters: Vec<Filter>) -> Self {
        Self::Many(filters.into_iter().map(FilterSpec::from).collect())
    }
}

/// A validated filter. Serializes back to the [`FilterSpec`] wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "FilterSpec")]
pub struct Filter {
    dimension: Dimension,
    codes: Vec<String>,
    levels: Vec<u32>,
    expansion: Expansion,
}

impl Filter {
    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub const fn expansion(&self) -> Expansion {
        self.expansion
    }

    /// Checks one spec. Codes are trimmed and de-duplicated, as are levels.
    pub fn from_spec(spec: &FilterSpec) -> Result<Self, ValidationError> {
        let dimension: Dimension = spec.dimension.parse()?;
        let codes = dedup(
            spec.codes
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        let levels = dedup(spec.levels.iter().copied());
        let name = || dimension.as_str().to_string();

        let expansion = match (spec.children, spec.children_include_self) {
            (true, true) => {
                return Err(ValidationError::ConflictingChildFlags { dimension: name() });
            }
            (true, false) => Expansion::Children,
            (false, true) => Expansion::ChildrenIncludeSelf,
            (false, false) => Expansion::None,
        };

        if expansion != Expansion::None {
            if codes.len() != 1 {
                return Err(ValidationError::InvalidChildrenUsage {
                    dimension: name(),
                    count: codes.len(),
                });
            }
            if !levels.is_empty() {
                return Err(ValidationError::ConflictingLevelsAndChildren { dimension: name() });
            }
        } else if codes.is_empty() && levels.is_empty() {
            return Err(ValidationError::EmptyFilter { dimension: name() });
        }

        Ok(Self {
            dimension,
            codes,
            levels,
            expansion,
        })
    }

    /// Order-independent copy used for cache keys.
    pub(crate) fn canonical(&self) -> Self {
        let mut out = self.clone();
        out.codes.sort();
        out.levels.sort_unstable();
        out
    }
}

impl From<Filter> for FilterSpec {
    fn from(f: Filter) -> Self {
        Self {
            dimension: f.dimension.as_str().to_string(),
            levels: f.levels,
            codes: f.codes,
            children: f.expansion == Expansion::Children,
            children_include_self: f.expansion == Expansion::ChildrenIncludeSelf,
        }
    }
}

/// Validates one or many filter specs, preserving their order.
///
/// The same dimension may appear more than once. An empty list is rejected.
pub fn validate(input: impl Into<FilterInput>) -> Result<Vec<Filter>, ValidationError> {
    match input.into() {
        FilterInput::One(spec) => Ok(vec![Filter::from_spec(&spec)?]),
        FilterInput::Many(specs) => {
            if specs.is_empty() {
                return Err(ValidationError::EmptyFilterList);
            }
            specs.iter().map(Filter::from_spec).collect()
        }
    }
}

/// Filters sorted into a canonical order, each with sorted codes and levels.
pub(crate) fn canonical_set(filters: &[Filter]) -> Vec<Filter> {
    let mut out: Vec<Filter> = filters.iter().map(Filter::canonical).collect();
    out.sort_by(|a, b| {
        (a.dimension, a.expansion, &a.codes, &a.levels).cmp(&(
            b.dimension,
            b.expansion,
            &b.codes,
            &b.levels,
        ))
    });
    out
}

fn dedup<T: PartialEq>(items: impl Iterator<Item = T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
