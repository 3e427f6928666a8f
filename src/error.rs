use thiserror::Error;

/// Why a single indicator could not be loaded.
///
/// A failure never aborts a build: the indicator is replaced by an empty
/// record set and the error is reported next to the figures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network error, timeout or non-2xx status.
    #[error("request failed for {indicator}: {message}")]
    Request { indicator: String, message: String },

    /// Body was not JSON or did not have the `[meta, records]` shape.
    #[error("unexpected response for {indicator}: {message}")]
    Parse { indicator: String, message: String },
}

impl FetchError {
    pub fn request(indicator: &str, message: impl Into<String>) -> Self {
        FetchError::Request {
            indicator: indicator.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(indicator: &str, message: impl Into<String>) -> Self {
        FetchError::Parse {
            indicator: indicator.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("at least one country is required")]
    NoCountries,

    #[error("invalid country '{0}': expected NAME=ISO3")]
    CountrySyntax(String),

    #[error("invalid ISO-3 code '{code}' for {name}")]
    IsoCode { name: String, code: String },

    #[error("duplicate ISO-3 code '{0}'")]
    DuplicateIso(String),

    #[error("{required} indicators are required, got {got}")]
    TooFewIndicators { required: usize, got: usize },

    #[error("indicator code at position {0} is empty")]
    EmptyIndicator(usize),

    #[error("invalid date range {start}:{end}")]
    DateRange { start: i32, end: i32 },

    #[error("end year {end} is after the current year {current}")]
    FutureYear { end: i32, current: i32 },

    #[error("per_page must be > 0")]
    PerPage,

    #[error("request timeout must be > 0")]
    Timeout,
}
