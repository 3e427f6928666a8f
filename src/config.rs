use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Datelike;

use crate::error::ConfigError;

// ----------------------- Defaults -----------------------
pub const WORLD_BANK_BASE: &str = "https://api.worldbank.org/v2";

/// Ten largest economies, in legend order.
pub const DEFAULT_COUNTRIES: &[(&str, &str)] = &[
    ("Canada", "CAN"),
    ("United States", "USA"),
    ("Brazil", "BRA"),
    ("France", "FRA"),
    ("India", "IND"),
    ("Italy", "ITA"),
    ("Germany", "DEU"),
    ("United Kingdom", "GBR"),
    ("China", "CHN"),
    ("Japan", "JPN"),
];

pub const DEFAULT_INDICATORS: &[&str] = &[
    "EG.USE.ELEC.KH.PC", // Electric power consumption (kWh per capita)
    "EG.FEC.RNEW.ZS",    // Renewable energy consumption (% of total final energy consumption)
    "EG.USE.PCAP.KG.OE", // Energy use (kg of oil equivalent per capita)
    "EN.ATM.GHGT.KT.CE", // Total greenhouse gas emissions (kt of CO2 equivalent)
];

pub const DEFAULT_START_YEAR: i32 = 1990;
pub const DEFAULT_END_YEAR: i32 = 2015;

/// Large enough that the default query fits on one page.
pub const DEFAULT_PER_PAGE: u32 = 1000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ----------------------- Types -----------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub name: String,
    pub iso3: String,
}

impl Country {
    pub fn new(name: &str, iso3: &str) -> Self {
        Self {
            name: name.to_string(),
            iso3: iso3.to_string(),
        }
    }

    /// Parses the CLI form `Name=ISO`, e.g. `United States=USA`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let (name, code) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::CountrySyntax(s.to_string()))?;
        let name = name.trim();
        let code = code.trim();
        if name.is_empty() || code.is_empty() {
            return Err(ConfigError::CountrySyntax(s.to_string()));
        }
        Ok(Self::new(name, &code.to_uppercase()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: i32,
    pub end: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMode {
    Disabled,
    Dir(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub countries: Vec<Country>,
    pub indicators: Vec<String>,
    pub date_range: DateRange,
    pub per_page: u32,
    pub api_base: String,
    pub timeout: Duration,
    pub cache: CacheMode,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            countries: DEFAULT_COUNTRIES
                .iter()
                .map(|(name, iso)| Country::new(name, iso))
                .collect(),
            indicators: DEFAULT_INDICATORS.iter().map(|c| c.to_string()).collect(),
            date_range: DateRange {
                start: DEFAULT_START_YEAR,
                end: DEFAULT_END_YEAR,
            },
            per_page: DEFAULT_PER_PAGE,
            api_base: WORLD_BANK_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            cache: CacheMode::Disabled,
        }
    }
}

impl BuilderConfig {
    /// `iso;iso;...` in lower case, the API's multi-country filter.
    pub fn country_filter(&self) -> String {
        self.countries
            .iter()
            .map(|c| c.iso3.to_lowercase())
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn validate(&self, required_indicators: usize) -> Result<(), ConfigError> {
        if self.countries.is_empty() {
            return Err(ConfigError::NoCountries);
        }

        let mut seen = HashSet::new();
        for c in &self.countries {
            if c.iso3.len() != 3 || !c.iso3.chars().all(|ch| ch.is_ascii_alphabetic()) {
                return Err(ConfigError::IsoCode {
                    name: c.name.clone(),
                    code: c.iso3.clone(),
                });
            }
            if !seen.insert(c.iso3.to_uppercase()) {
                return Err(ConfigError::DuplicateIso(c.iso3.clone()));
            }
        }

        if self.indicators.len() < required_indicators {
            return Err(ConfigError::TooFewIndicators {
                required: required_indicators,
                got: self.indicators.len(),
            });
        }
        if let Some(pos) = self.indicators.iter().position(|c| c.trim().is_empty()) {
            return Err(ConfigError::EmptyIndicator(pos));
        }

        let DateRange { start, end } = self.date_range;
        if start > end {
            return Err(ConfigError::DateRange { start, end });
        }
        let current = chrono::Utc::now().date_naive().year();
        if end > current {
            return Err(ConfigError::FutureYear { end, current });
        }

        if self.per_page == 0 {
            return Err(ConfigError::PerPage);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Timeout);
        }

        Ok(())
    }
}

/// `<platform cache dir>/indicator-figures`
pub fn default_cache_dir() -> Option<PathBuf> {
    let mut dir = dirs::cache_dir()?;
    dir.push("indicator-figures");
    Some(dir)
}
