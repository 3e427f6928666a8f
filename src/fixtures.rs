//! In-memory `IndicatorSource` for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::error::FetchError;
use crate::worldbank::IndicatorSource;

pub fn observation(indicator: &str, country: &str, iso3: &str, date: &str, value: Option<f64>) -> Value {
    let id = &iso3[..2];
    json!({
        "indicator": {"id": indicator, "value": format!("{} name", indicator)},
        "country": {"id": id, "value": country},
        "countryiso3code": iso3,
        "date": date,
        "value": value,
        "unit": "",
        "obs_status": "",
        "decimal": 0
    })
}

/// Single-page `[meta, records]` body.
pub fn response(records: Vec<Value>) -> Value {
    json!([
        {"page": 1, "pages": 1, "per_page": 1000, "total": records.len()},
        records
    ])
}

/// Answers by indicator code and `page=` parameter; records every URL asked for.
#[derive(Default)]
pub struct FixtureSource {
    pages: HashMap<String, Vec<Result<Value, FetchError>>>,
    calls: Mutex<Vec<String>>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, indicator: &str, records: Vec<Value>) -> Self {
        self.with_pages(indicator, vec![Ok(response(records))])
    }

    pub fn failing(self, indicator: &str, err: FetchError) -> Self {
        self.with_pages(indicator, vec![Err(err)])
    }

    pub fn with_pages(mut self, indicator: &str, pages: Vec<Result<Value, FetchError>>) -> Self {
        self.pages.insert(indicator.to_string(), pages);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl IndicatorSource for FixtureSource {
    async fn get_json(&self, indicator: &str, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());

        let page: usize = url
            .split("&page=")
            .nth(1)
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);

        self.pages
            .get(indicator)
            .and_then(|pages| pages.get(page - 1))
            .cloned()
            .unwrap_or_else(|| Err(FetchError::request(indicator, "404 Not Found")))
    }
}
