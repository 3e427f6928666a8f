//! Pulls World Bank indicator series for a set of countries and shapes them
//! into four chart-ready `{data, layout}` figures.

pub mod config;
pub mod error;
pub mod figures;
pub mod worldbank;

#[cfg(test)]
mod fixtures;

pub use config::{BuilderConfig, CacheMode, Country, DateRange};
pub use error::{ConfigError, FetchError};
pub use figures::{BuildReport, FigureBuilder, FigureResult, IndicatorFailure, Trace, CHARTS};
pub use worldbank::{IndicatorRecord, IndicatorSource, WorldBankClient};
