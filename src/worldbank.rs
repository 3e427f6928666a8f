use std::fs;
use std::path::PathBuf;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{BuilderConfig, CacheMode, DateRange};
use crate::error::FetchError;

// ----------------------- Records -----------------------

/// One flattened observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRecord {
    /// Indicator display name, e.g. "Electric power consumption (kWh per capita)".
    pub indicator: String,
    /// Country display name as the API spells it.
    pub country: String,
    pub country_code: String,
    /// Year as text ("1990").
    pub date: String,
    pub value: Option<f64>,
}

// Raw observation as served by /v2/country/{..}/indicator/{..}:
// {"indicator":{"id":"EG.USE.ELEC.KH.PC","value":"..."},
//  "country":{"id":"CA","value":"Canada"},"countryiso3code":"CAN",
//  "date":"2015","value":15588.4,"unit":"","obs_status":"","decimal":0}
#[derive(Debug, Deserialize)]
struct RawObservation {
    indicator: CodedName,
    country: CodedName,
    #[serde(rename = "countryiso3code", default)]
    country_code: String,
    date: String,
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CodedName {
    value: String,
}

impl From<RawObservation> for IndicatorRecord {
    fn from(raw: RawObservation) -> Self {
        IndicatorRecord {
            indicator: raw.indicator.value,
            country: raw.country.value,
            country_code: raw.country_code,
            date: raw.date,
            value: raw.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub pages: u32,
    pub records: Vec<IndicatorRecord>,
}

/// Reads a `[meta, records]` body.
///
/// `records` is `null` when the filter matches nothing; that is an empty
/// page, not an error. The API reports bad codes with a one-element
/// `[{"message": [{"id": .., "value": ..}]}]` body.
pub fn parse_page(indicator: &str, body: Value) -> Result<Page, FetchError> {
    let mut items = match body {
        Value::Array(items) => items,
        other => {
            return Err(FetchError::parse(
                indicator,
                format!("expected a JSON array, got {}", json_kind(&other)),
            ))
        }
    };

    if let Some(messages) = items.first().and_then(|m| m.get("message")) {
        let text = messages
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|m| m.get("value").and_then(|v| v.as_str()))
                    .collect::<Vec<_>>()
                    .join("; ")
            })
            .unwrap_or_default();
        return Err(FetchError::parse(indicator, format!("API error: {}", text)));
    }

    if items.len() < 2 {
        return Err(FetchError::parse(
            indicator,
            format!("expected [meta, records], got {} element(s)", items.len()),
        ));
    }

    let records = items.swap_remove(1);
    let meta = &items[0];
    let claimed = meta_u64(meta, "pages").unwrap_or(1);
    let pages = u32::try_from(claimed)
        .map_err(|_| FetchError::parse(indicator, format!("page count {} out of range", claimed)))?;

    // pages can never exceed what total/per_page allows
    if let (Some(total), Some(per_page)) = (meta_u64(meta, "total"), meta_u64(meta, "per_page")) {
        if per_page > 0 && claimed > total.div_ceil(per_page).max(1) {
            return Err(FetchError::parse(
                indicator,
                format!("meta claims {} pages for {} records at {} per page", claimed, total, per_page),
            ));
        }
    }

    let records = match records {
        Value::Null => Vec::new(),
        Value::Array(_) => serde_json::from_value::<Vec<RawObservation>>(records)
            .map_err(|e| FetchError::parse(indicator, format!("bad observation: {}", e)))?
            .into_iter()
            .map(IndicatorRecord::from)
            .collect(),
        other => {
            return Err(FetchError::parse(
                indicator,
                format!("records must be an array, got {}", json_kind(&other)),
            ))
        }
    };

    Ok(Page {
        pages: pages.max(1),
        records,
    })
}

// The API has served meta numbers both as numbers and as strings.
fn meta_u64(meta: &Value, key: &str) -> Option<u64> {
    let v = meta.get(key)?;
    v.as_u64().or_else(|| v.as_str()?.parse().ok())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ----------------------- Query -----------------------

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorQuery {
    pub api_base: String,
    pub country_filter: String,
    pub indicator: String,
    pub date_range: DateRange,
    pub per_page: u32,
}

impl IndicatorQuery {
    pub fn new(cfg: &BuilderConfig, indicator: &str) -> Self {
        Self {
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            country_filter: cfg.country_filter(),
            indicator: indicator.to_string(),
            date_range: cfg.date_range,
            per_page: cfg.per_page,
        }
    }

    // e.g. https://api.worldbank.org/v2/country/usa;bra/indicator/AG.LND.ARBL.HA?date=1990:2015&per_page=1000&format=json
    pub fn url(&self, page: u32) -> String {
        let mut url = format!(
            "{}/country/{}/indicator/{}?date={}:{}&per_page={}&format=json",
            self.api_base,
            self.country_filter,
            self.indicator,
            self.date_range.start,
            self.date_range.end,
            self.per_page
        );
        if page > 1 {
            url.push_str(&format!("&page={}", page));
        }
        url
    }
}

// ----------------------- Source -----------------------

/// The HTTP side of a build: turns a URL into a parsed JSON body.
#[allow(async_fn_in_trait)]
pub trait IndicatorSource {
    async fn get_json(&self, indicator: &str, url: &str) -> Result<Value, FetchError>;
}

/// Fetches every page of one indicator, in page order.
pub async fn fetch_indicator<S: IndicatorSource>(
    source: &S,
    query: &IndicatorQuery,
) -> Result<Vec<IndicatorRecord>, FetchError> {
    let url = query.url(1);
    debug!("GET {}", url);
    let first = parse_page(&query.indicator, source.get_json(&query.indicator, &url).await?)?;

    let mut records = first.records;
    if first.pages > 1 {
        debug!("{} spans {} pages", query.indicator, first.pages);
    }
    for page in 2..=first.pages {
        let url = query.url(page);
        debug!("GET {}", url);
        let next = parse_page(&query.indicator, source.get_json(&query.indicator, &url).await?)?;
        records.extend(next.records);
    }

    info!("{}: {} records", query.indicator, records.len());
    Ok(records)
}

// ----------------------- HTTP client -----------------------

pub struct WorldBankClient {
    client: Client,
    cache_dir: Option<PathBuf>,
}

impl WorldBankClient {
    pub fn new(cfg: &BuilderConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("indicator-figures/", env!("CARGO_PKG_VERSION"), " (rust reqwest)"))
            .timeout(cfg.timeout)
            .build()?;

        let cache_dir = match &cfg.cache {
            CacheMode::Disabled => None,
            CacheMode::Dir(dir) => {
                if let Err(e) = fs::create_dir_all(dir) {
                    warn!("cache disabled, cannot create {}: {}", dir.display(), e);
                    None
                } else {
                    Some(dir.clone())
                }
            }
        };

        Ok(Self { client, cache_dir })
    }

    async fn download(&self, indicator: &str, url: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::request(indicator, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::request(
                indicator,
                format!("{} returned {}: {}", url, status, body.trim()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FetchError::request(indicator, e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl IndicatorSource for WorldBankClient {
    async fn get_json(&self, indicator: &str, url: &str) -> Result<Value, FetchError> {
        let cache_file = self.cache_dir.as_ref().map(|dir| dir.join(cache_key(url)));

        if let Some(path) = &cache_file {
            if let Ok(b) = fs::read(path) {
                if let Ok(v) = serde_json::from_slice::<Value>(&b) {
                    debug!("cache hit {}", path.display());
                    return Ok(v);
                }
            }
        }

        let bytes = self.download(indicator, url).await?;
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::parse(indicator, format!("invalid JSON: {}", e)))?;

        if let Some(path) = &cache_file {
            if let Err(e) = fs::write(path, &bytes) {
                warn!("could not write cache file {}: {}", path.display(), e);
            }
        }

        Ok(value)
    }
}

/// File name for a cached response body.
pub fn cache_key(url: &str) -> String {
    let trimmed = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let mut key: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    key.push_str(".json");
    key
}
