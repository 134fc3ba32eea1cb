use reqwest::StatusCode;
use thiserror::Error;

use crate::format::WireFormat;
use crate::util::excerpt;

/// Longest server body excerpt carried by [`Error::Api`].
const BODY_EXCERPT_LEN: usize = 512;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure a [`Client`](crate::Client) call can report.
///
/// Nothing is retried internally; callers match on the variant to decide.
#[derive(Debug, Error)]
pub enum Error {
    /// Parameters were rejected before any request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server answered with a non-2xx status.
    #[error("API request failed: HTTP {status} for url ({url})\n{message}")]
    Api {
        status: u16,
        url: String,
        message: String,
    },

    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The body could not be read as the declared format.
    #[error("failed to decode {format} response ({len} bytes): {reason}")]
    Decode {
        format: WireFormat,
        len: usize,
        reason: String,
    },

    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),
}

impl Error {
    pub(crate) fn decode(format: WireFormat, len: usize, reason: impl ToString) -> Self {
        Self::Decode {
            format,
            len,
            reason: reason.to_string(),
        }
    }

    /// HTTP status of an [`Error::Api`], if that is what this is.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Shape violations in filters or call parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("dimension must be one of d1..d7, got '{0}'")]
    InvalidDimension(String),

    #[error(
        "dimension {dimension}: children/children_include_self need exactly one code, got {count}"
    )]
    InvalidChildrenUsage { dimension: String, count: usize },

    #[error("dimension {dimension}: children and children_include_self cannot both be set")]
    ConflictingChildFlags { dimension: String },

    #[error("dimension {dimension}: levels cannot be combined with children/children_include_self")]
    ConflictingLevelsAndChildren { dimension: String },

    #[error(
        "dimension {dimension}: must provide at least one of codes, levels, children, or children_include_self"
    )]
    EmptyFilter { dimension: String },

    #[error("filter list cannot be empty")]
    EmptyFilterList,

    #[error("{0}")]
    InvalidParameterCombination(&'static str),

    #[error("{field} must be a 4-digit year (e.g. \"2020\"), got '{value}'")]
    InvalidDateFormat { field: &'static str, value: String },

    #[error("analysis is only available for selections, not for raw time-series codes")]
    AnalysisRequiresSelection,

    #[error("unknown selection status flag '{0}' (expected any of U, P, S, O, W)")]
    InvalidStatusFlag(char),

    #[error("frequency must not be empty")]
    InvalidFrequency,

    #[error("unsupported response format '{format}' (expected one of: {supported})")]
    UnsupportedFormat { format: String, supported: String },
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) detail: Option<String>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

/// Turns a non-2xx response into an [`Error::Api`] with a readable message.
pub(crate) fn api_error(status: u16, url: &str, body: &[u8]) -> Error {
    let text = String::from_utf8_lossy(body);
    let server = match serde_json::from_str::<ApiErrorResponse>(&text) {
        Ok(e) => e
            .detail
            .or(e.message)
            .or(e.error)
            .unwrap_or_else(|| excerpt(&text, BODY_EXCERPT_LEN)),
        Err(_) => excerpt(&text, BODY_EXCERPT_LEN),
    };

    let code = StatusCode::from_u16(status).ok();
    let message = if code == Some(StatusCode::UNAUTHORIZED) || code == Some(StatusCode::FORBIDDEN)
    {
        format!(
            "EasyData rejected the API key.\n- Check EASYDATA_API_KEY or `key:` in .easydatarc\n- Ensure the key has access to the requested dataset\n\nServer message: {}",
            server
        )
    } else if code == Some(StatusCode::NOT_FOUND) {
        format!(
            "Resource not found. The recipe or selection may not exist, or the base URL is wrong (expected e.g. https://www.easydata.co.za/api/v3).\n\nServer message: {}",
            server
        )
    } else {
        server
    };

    Error::Api {
        status,
        url: url.to_string(),
        message,
    }
}
