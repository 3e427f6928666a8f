use serde::Serialize;
use tracing::{info, warn};

use crate::config::BuilderConfig;
use crate::error::{ConfigError, FetchError};
use crate::worldbank::{fetch_indicator, IndicatorQuery, IndicatorRecord, IndicatorSource};

// ----------------------- Chart definitions -----------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    StackedBar,
}

#[derive(Debug, Clone, Copy)]
pub struct ChartSpec {
    /// Position in `BuilderConfig::indicators`.
    pub source: usize,
    pub years: &'static [&'static str],
    pub kind: ChartKind,
    pub title: &'static str,
    pub x_title: &'static str,
    pub y_title: &'static str,
}

const YEARS_TO_2014: &[&str] = &["1990", "1995", "2000", "2005", "2010", "2014"];
const YEARS_TO_2015: &[&str] = &["1990", "1995", "2000", "2005", "2010", "2015"];

/// The four published charts, in output order.
///
/// Chart 1 samples 2014 while the others sample 2015, and the energy-use
/// chart reads indicator 1 rather than 2. Both are kept as published.
pub const CHARTS: [ChartSpec; 4] = [
    ChartSpec {
        source: 0,
        years: YEARS_TO_2014,
        kind: ChartKind::Line,
        title: "Electric power consumption 1990 to 2015<br>(kWh per capita)",
        x_title: "Year",
        y_title: "KWh (Thousand)",
    },
    ChartSpec {
        source: 1,
        years: YEARS_TO_2015,
        kind: ChartKind::StackedBar,
        title: "% Renewable energy consumption 1990 to 2015",
        x_title: "Year",
        y_title: "% of total final energy",
    },
    ChartSpec {
        source: 1,
        years: YEARS_TO_2015,
        kind: ChartKind::Line,
        title: "Energy use <br> (kg of oil equivalent per capita)",
        x_title: "Year",
        y_title: "Energy (Kg of oil)",
    },
    ChartSpec {
        source: 3,
        years: YEARS_TO_2015,
        kind: ChartKind::StackedBar,
        title: "Total greenhouse gas emissions 1990-2015<br>(kt of CO2 equivalent)",
        x_title: "Year",
        y_title: "CO2 equivalents (kilo tonnes)",
    },
];

/// Number of indicators the chart set reads from.
pub fn required_indicators() -> usize {
    CHARTS.iter().map(|c| c.source).max().map_or(0, |m| m + 1)
}

// ----------------------- Output types -----------------------

pub const LINES_MARKERS: &str = "lines+markers";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub x: Vec<String>,
    pub y: Vec<Option<f64>>,
    pub name: String,
}

/// One legend entry, in the front-end's trace format.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Scatter {
        mode: &'static str,
        #[serde(flatten)]
        series: Series,
    },
    Bar {
        #[serde(flatten)]
        series: Series,
    },
}

impl Trace {
    pub fn series(&self) -> &Series {
        match self {
            Trace::Scatter { series, .. } | Trace::Bar { series } => series,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BarMode {
    Stack,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: String,
    pub xaxis: Axis,
    pub yaxis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<BarMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureResult {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

// ----------------------- Shaping -----------------------

/// Rows whose date is in `years`, stable-sorted by date.
fn select_years<'a>(records: &'a [IndicatorRecord], years: &[&str]) -> Vec<&'a IndicatorRecord> {
    let mut rows: Vec<&IndicatorRecord> = records
        .iter()
        .filter(|r| years.contains(&r.date.as_str()))
        .collect();
    rows.sort_by(|a, b| a.date.cmp(&b.date));
    rows
}

/// Legend order shared by every chart: countries of the first chart's
/// source, first-seen after year filtering and sorting.
pub fn canonical_order(records: &[IndicatorRecord]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for row in select_years(records, CHARTS[0].years) {
        if !order.iter().any(|c| c == &row.country) {
            order.push(row.country.clone());
        }
    }
    order
}

/// Builds one figure. Every country in `order` gets a trace, empty when
/// the data has nothing for it; countries outside `order` are dropped.
pub fn assemble(spec: &ChartSpec, records: &[IndicatorRecord], order: &[String]) -> FigureResult {
    let rows = select_years(records, spec.years);

    let data = order
        .iter()
        .map(|country| {
            let (x, y): (Vec<String>, Vec<Option<f64>>) = rows
                .iter()
                .filter(|r| &r.country == country)
                .map(|r| (r.date.clone(), r.value))
                .unzip();
            let series = Series {
                x,
                y,
                name: country.clone(),
            };
            match spec.kind {
                ChartKind::Line => Trace::Scatter {
                    mode: LINES_MARKERS,
                    series,
                },
                ChartKind::StackedBar => Trace::Bar { series },
            }
        })
        .collect();

    let layout = Layout {
        title: spec.title.to_string(),
        xaxis: Axis {
            title: spec.x_title.to_string(),
        },
        yaxis: Axis {
            title: spec.y_title.to_string(),
        },
        barmode: match spec.kind {
            ChartKind::Line => None,
            ChartKind::StackedBar => Some(BarMode::Stack),
        },
    };

    FigureResult { data, layout }
}

// ----------------------- Builder -----------------------

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFailure {
    pub index: usize,
    pub code: String,
    pub error: FetchError,
}

/// Four figures plus the indicators that had to be replaced by an empty
/// record set.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub figures: Vec<FigureResult>,
    pub failures: Vec<IndicatorFailure>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One line for the whole build; per-indicator causes are logged by `build`.
    pub fn failure_summary(&self, requested: usize) -> Option<String> {
        if self.is_complete() {
            return None;
        }
        let codes: Vec<&str> = self.failures.iter().map(|f| f.code.as_str()).collect();
        Some(format!(
            "{} of {} indicators failed ({}); affected charts have empty series",
            self.failures.len(),
            requested,
            codes.join(", ")
        ))
    }

    /// Figures only if every indicator loaded, else the first failure.
    pub fn into_strict(self) -> Result<Vec<FigureResult>, FetchError> {
        match self.failures.into_iter().next() {
            Some(f) => Err(f.error),
            None => Ok(self.figures),
        }
    }
}

pub struct FigureBuilder<S> {
    source: S,
}

impl<S: IndicatorSource> FigureBuilder<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetches each indicator once, in order, and assembles `CHARTS`.
    ///
    /// A failed indicator contributes no rows; it never borrows rows from
    /// another indicator. Only configuration problems are returned as `Err`.
    pub async fn build(&self, cfg: &BuilderConfig) -> Result<BuildReport, ConfigError> {
        cfg.validate(required_indicators())?;

        let mut tables: Vec<Vec<IndicatorRecord>> = Vec::with_capacity(cfg.indicators.len());
        let mut failures = Vec::new();

        for (index, code) in cfg.indicators.iter().enumerate() {
            let query = IndicatorQuery::new(cfg, code);
            match fetch_indicator(&self.source, &query).await {
                Ok(records) => tables.push(records),
                Err(error) => {
                    warn!("could not load data for {}: {}", code, error);
                    failures.push(IndicatorFailure {
                        index,
                        code: code.clone(),
                        error,
                    });
                    tables.push(Vec::new());
                }
            }
        }

        let order = canonical_order(&tables[CHARTS[0].source]);
        info!("legend order: {}", order.join(", "));

        let figures = CHARTS
            .iter()
            .map(|spec| assemble(spec, &tables[spec.source], &order))
            .collect();

        Ok(BuildReport { figures, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Country;
    use crate::fixtures::{observation, FixtureSource};
    use serde_json::{json, Value};

    const ELEC: &str = "EG.USE.ELEC.KH.PC";
    const RNEW: &str = "EG.FEC.RNEW.ZS";
    const ENERGY: &str = "EG.USE.PCAP.KG.OE";
    const GHG: &str = "EN.ATM.GHGT.KT.CE";

    fn config() -> BuilderConfig {
        let mut cfg = BuilderConfig::default();
        cfg.countries = vec![
            Country::new("Canada", "CAN"),
            Country::new("Brazil", "BRA"),
            Country::new("Japan", "JPN"),
        ];
        cfg
    }

    fn obs(code: &str, country: &str, date: &str, value: f64) -> Value {
        let iso = match country {
            "Canada" => "CAN",
            "Brazil" => "BRA",
            _ => "JPN",
        };
        observation(code, country, iso, date, Some(value))
    }

    fn fixtures() -> FixtureSource {
        FixtureSource::new()
            .with(
                ELEC,
                vec![
                    obs(ELEC, "Canada", "2014", 15.0),
                    obs(ELEC, "Canada", "1992", 99.0),
                    obs(ELEC, "Canada", "1990", 14.0),
                    obs(ELEC, "Brazil", "2015", 2.6),
                    obs(ELEC, "Brazil", "2014", 2.5),
                    obs(ELEC, "Brazil", "1990", 1.4),
                ],
            )
            .with(
                RNEW,
                vec![
                    obs(RNEW, "Canada", "2015", 22.0),
                    obs(RNEW, "Canada", "1990", 20.0),
                    obs(RNEW, "Brazil", "2015", 43.0),
                    obs(RNEW, "Brazil", "1992", 99.0),
                    obs(RNEW, "Brazil", "1990", 49.0),
                ],
            )
            .with(
                ENERGY,
                vec![
                    obs(ENERGY, "Canada", "2015", 7600.0),
                    obs(ENERGY, "Brazil", "2015", 1400.0),
                ],
            )
            .with(GHG, vec![obs(GHG, "Canada", "2015", 730000.0)])
    }

    // Canada is listed first, but Brazil's 1990 row precedes Canada's.
    fn fixtures_brazil_first() -> FixtureSource {
        FixtureSource::new()
            .with(
                ELEC,
                vec![
                    obs(ELEC, "Canada", "2014", 15.0),
                    obs(ELEC, "Brazil", "1990", 1.4),
                    obs(ELEC, "Canada", "1990", 14.0),
                ],
            )
            .with(RNEW, vec![obs(RNEW, "Canada", "1990", 20.0), obs(RNEW, "Brazil", "1990", 49.0)])
            .with(ENERGY, vec![])
            .with(GHG, vec![])
    }

    fn names(fig: &FigureResult) -> Vec<&str> {
        fig.data.iter().map(|t| t.series().name.as_str()).collect()
    }

    #[test]
    fn test_chart_table() {
        let sources: Vec<usize> = CHARTS.iter().map(|c| c.source).collect();
        assert_eq!(sources, vec![0, 1, 1, 3]);
        assert_eq!(required_indicators(), 4);
        assert!(CHARTS[0].years.contains(&"2014"));
        assert!(!CHARTS[0].years.contains(&"2015"));
        for spec in &CHARTS[1..] {
            assert!(spec.years.contains(&"2015"));
            assert!(!spec.years.contains(&"2014"));
        }
    }

    #[tokio::test]
    async fn test_build_returns_four_figures_in_order() {
        let report = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.figures.len(), 4);
        for (fig, spec) in report.figures.iter().zip(CHARTS.iter()) {
            assert_eq!(fig.layout.title, spec.title);
        }
        assert!(matches!(report.figures[0].data[0], Trace::Scatter { .. }));
        assert!(matches!(report.figures[1].data[0], Trace::Bar { .. }));
        assert!(matches!(report.figures[2].data[0], Trace::Scatter { .. }));
        assert!(matches!(report.figures[3].data[0], Trace::Bar { .. }));
    }

    #[tokio::test]
    async fn test_one_request_per_indicator() {
        let builder = FigureBuilder::new(fixtures());
        builder.build(&config()).await.unwrap();

        let calls = builder.source().calls();
        assert_eq!(calls.len(), 4);
        assert!(calls[0].contains("/country/can;bra;jpn/indicator/EG.USE.ELEC.KH.PC?"));
        assert!(calls[3].contains("/indicator/EN.ATM.GHGT.KT.CE?date=1990:2015&per_page=1000"));
    }

    #[tokio::test]
    async fn test_canonical_order_shared_by_all_charts() {
        let report = FigureBuilder::new(fixtures_brazil_first())
            .build(&config())
            .await
            .unwrap();

        for fig in &report.figures {
            assert_eq!(names(fig), vec!["Brazil", "Canada"]);
        }
    }

    #[tokio::test]
    async fn test_year_filter_is_exact() {
        let report = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();

        for fig in &report.figures {
            for trace in &fig.data {
                assert!(!trace.series().x.iter().any(|d| d == "1992"));
                assert!(!trace.series().y.contains(&Some(99.0)));
            }
        }

        // chart 1 samples 2014, so Brazil's 2015 electricity row is dropped
        let brazil = &report.figures[0].data[1].series();
        assert_eq!(brazil.name, "Brazil");
        assert_eq!(brazil.x, vec!["1990", "2014"]);
        assert_eq!(brazil.y, vec![Some(1.4), Some(2.5)]);
    }

    #[tokio::test]
    async fn test_series_sorted_by_year() {
        let report = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();
        let canada = report.figures[1].data[0].series();
        assert_eq!(canada.name, "Canada");
        assert_eq!(canada.x, vec!["1990", "2015"]);
        assert_eq!(canada.y, vec![Some(20.0), Some(22.0)]);
    }

    #[tokio::test]
    async fn test_absent_country_gets_empty_series() {
        let report = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();

        let ghg = &report.figures[3];
        assert_eq!(names(ghg), vec!["Canada", "Brazil"]);
        let brazil = ghg.data[1].series();
        assert!(brazil.x.is_empty());
        assert!(brazil.y.is_empty());

        // Japan was requested but has no rows in indicator 0: no trace anywhere
        for fig in &report.figures {
            assert!(!names(fig).contains(&"Japan"));
        }
    }

    #[tokio::test]
    async fn test_energy_chart_reads_indicator_one() {
        let report = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();

        let renewables: Vec<&Series> = report.figures[1].data.iter().map(Trace::series).collect();
        let energy: Vec<&Series> = report.figures[2].data.iter().map(Trace::series).collect();
        assert_eq!(renewables, energy);
        assert!(!energy.iter().any(|s| s.y.contains(&Some(7600.0))));
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let builder = FigureBuilder::new(fixtures());
        let first = builder.build(&config()).await.unwrap();
        let second = builder.build(&config()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_value(&first.figures).unwrap(),
            serde_json::to_value(&second.figures).unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_indicator_is_reported_not_fatal() {
        let source = fixtures().failing(ENERGY, FetchError::request(ENERGY, "timed out"));
        let report = FigureBuilder::new(source).build(&config()).await.unwrap();

        assert_eq!(report.figures.len(), 4);
        assert_eq!(
            report.failures,
            vec![IndicatorFailure {
                index: 2,
                code: ENERGY.to_string(),
                error: FetchError::request(ENERGY, "timed out"),
            }]
        );
        // no chart reads indicator 2, so the figures match a clean run
        let clean = FigureBuilder::new(fixtures()).build(&config()).await.unwrap();
        assert_eq!(report.figures, clean.figures);

        assert_eq!(
            report.failure_summary(4).as_deref(),
            Some("1 of 4 indicators failed (EG.USE.PCAP.KG.OE); affected charts have empty series")
        );
        assert_eq!(clean.failure_summary(4), None);

        assert_eq!(
            report.into_strict(),
            Err(FetchError::request(ENERGY, "timed out"))
        );
    }

    #[tokio::test]
    async fn test_failed_indicator_yields_empty_series_not_stale_rows() {
        let source = fixtures().failing(RNEW, FetchError::parse(RNEW, "invalid JSON"));
        let report = FigureBuilder::new(source).build(&config()).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        for fig in &report.figures[1..3] {
            assert_eq!(names(fig), vec!["Canada", "Brazil"]);
            assert!(fig.data.iter().all(|t| t.series().x.is_empty()));
        }
    }

    #[tokio::test]
    async fn test_first_indicator_failure_empties_every_chart() {
        let source = fixtures().failing(ELEC, FetchError::request(ELEC, "503"));
        let report = FigureBuilder::new(source).build(&config()).await.unwrap();

        assert_eq!(report.figures.len(), 4);
        assert!(report.figures.iter().all(|f| f.data.is_empty()));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_invalid_config_fetches_nothing() {
        let mut cfg = config();
        cfg.indicators.pop();
        let builder = FigureBuilder::new(fixtures());

        assert_eq!(
            builder.build(&cfg).await,
            Err(ConfigError::TooFewIndicators { required: 4, got: 3 })
        );
        assert!(builder.source().calls().is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let records = vec![
            IndicatorRecord {
                indicator: "X".to_string(),
                country: "Canada".to_string(),
                country_code: "CAN".to_string(),
                date: "1990".to_string(),
                value: None,
            },
        ];
        let order = vec!["Canada".to_string()];

        let line = serde_json::to_value(assemble(&CHARTS[0], &records, &order)).unwrap();
        assert_eq!(
            line,
            json!({
                "data": [{"type": "scatter", "mode": "lines+markers", "x": ["1990"], "y": [null], "name": "Canada"}],
                "layout": {
                    "title": "Electric power consumption 1990 to 2015<br>(kWh per capita)",
                    "xaxis": {"title": "Year"},
                    "yaxis": {"title": "KWh (Thousand)"}
                }
            })
        );

        let bar = serde_json::to_value(assemble(&CHARTS[3], &records, &order)).unwrap();
        assert_eq!(bar["data"][0]["type"], "bar");
        assert!(bar["data"][0].get("mode").is_none());
        assert_eq!(bar["layout"]["barmode"], "stack");
    }
}
