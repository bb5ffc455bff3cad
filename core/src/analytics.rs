use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::GscError;

pub const DEFAULT_ROW_LIMIT: u64 = 1000;
/// Hard ceiling the Search Console API accepts per request.
pub const MAX_ROW_LIMIT: u64 = 25_000;
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which search surface the rows are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    Web,
    Image,
    Video,
    News,
    Discover,
    GoogleNews,
}

impl SearchType {
    pub const ALL: [SearchType; 6] = [
        SearchType::Web,
        SearchType::Image,
        SearchType::Video,
        SearchType::News,
        SearchType::Discover,
        SearchType::GoogleNews,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SearchType::Web => "web",
            SearchType::Image => "image",
            SearchType::Video => "video",
            SearchType::News => "news",
            SearchType::Discover => "discover",
            SearchType::GoogleNews => "googleNews",
        }
    }
}

impl FromStr for SearchType {
    type Err = GscError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        SearchType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == raw)
            .ok_or_else(|| {
                GscError::invalid_field(
                    "type",
                    format!(
                        "Invalid search type '{raw}'. Must be one of: {}",
                        join_names(SearchType::ALL.map(SearchType::as_str))
                    ),
                )
            })
    }
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the backend groups rows before returning them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationType {
    Auto,
    ByPage,
    ByProperty,
    ByNewsShowcasePanel,
}

impl AggregationType {
    pub const ALL: [AggregationType; 4] = [
        AggregationType::Auto,
        AggregationType::ByPage,
        AggregationType::ByProperty,
        AggregationType::ByNewsShowcasePanel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregationType::Auto => "auto",
            AggregationType::ByPage => "byPage",
            AggregationType::ByProperty => "byProperty",
            AggregationType::ByNewsShowcasePanel => "byNewsShowcasePanel",
        }
    }
}

impl FromStr for AggregationType {
    type Err = GscError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        AggregationType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == raw)
            .ok_or_else(|| {
                GscError::invalid_field(
                    "aggregationType",
                    format!(
                        "Invalid aggregation type '{raw}'. Must be one of: {}",
                        join_names(AggregationType::ALL.map(AggregationType::as_str))
                    ),
                )
            })
    }
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn join_names<const N: usize>(names: [&str; N]) -> String {
    names.join(", ")
}

/// Arguments of a `search_analytics` call after the dispatcher has checked
/// their JSON types, but before any semantic validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchAnalyticsRequest {
    pub site_url: String,
    pub start_date: String,
    pub end_date: String,
    /// `None` means no grouping was requested.
    pub dimensions: Option<Vec<String>>,
    pub search_type: Option<String>,
    pub aggregation_type: Option<String>,
    pub row_limit: Option<u64>,
}

/// A validated query. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsQuery {
    pub site_url: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub search_type: Option<SearchType>,
    pub aggregation_type: Option<AggregationType>,
    pub row_limit: u32,
}

impl AnalyticsQuery {
    pub fn from_request(request: SearchAnalyticsRequest) -> Result<Self, GscError> {
        if request.site_url.trim().is_empty() {
            return Err(GscError::invalid_field(
                "siteUrl",
                "'siteUrl' must not be empty",
            ));
        }

        let start_date = parse_date(&request.start_date, "startDate")?;
        let end_date = parse_date(&request.end_date, "endDate")?;

        let search_type = request
            .search_type
            .as_deref()
            .map(SearchType::from_str)
            .transpose()?;
        let aggregation_type = request
            .aggregation_type
            .as_deref()
            .map(AggregationType::from_str)
            .transpose()?;

        let row_limit = request.row_limit.unwrap_or(DEFAULT_ROW_LIMIT);
        if !(1..=MAX_ROW_LIMIT).contains(&row_limit) {
            return Err(GscError::invalid_field(
                "rowLimit",
                format!("'rowLimit' must be between 1 and {MAX_ROW_LIMIT}, got {row_limit}"),
            ));
        }

        Ok(Self {
            site_url: request.site_url,
            start_date,
            end_date,
            dimensions: request.dimensions.unwrap_or_default(),
            search_type,
            aggregation_type,
            // bounded above by MAX_ROW_LIMIT
            row_limit: row_limit as u32,
        })
    }

    /// Body for `searchanalytics.query`. Absent options are omitted, not nulled.
    pub fn to_request_body(&self) -> SearchAnalyticsQueryBody {
        SearchAnalyticsQueryBody {
            start_date: self.start_date.format(DATE_FORMAT).to_string(),
            end_date: self.end_date.format(DATE_FORMAT).to_string(),
            dimensions: self.dimensions.clone(),
            search_type: self.search_type,
            aggregation_type: self.aggregation_type,
            row_limit: self.row_limit,
        }
    }
}

fn parse_date(raw: &str, field: &str) -> Result<NaiveDate, GscError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| {
        GscError::invalid_field(
            field,
            format!("Dates must be in the format YYYY-MM-DD ('{field}' was '{raw}')"),
        )
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsQueryBody {
    pub start_date: String,
    pub end_date: String,
    pub dimensions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_type: Option<SearchType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_type: Option<AggregationType>,
    pub row_limit: u32,
}

/// Raw `searchanalytics.query` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsQueryResponse {
    #[serde(default)]
    pub rows: Vec<ApiDataRow>,
    #[serde(default)]
    pub response_aggregation_type: Option<String>,
}

/// One backend row: positional `keys` in the order dimensions were requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiDataRow {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub clicks: Option<f64>,
    #[serde(default)]
    pub impressions: Option<f64>,
    #[serde(default)]
    pub ctr: Option<f64>,
    #[serde(default)]
    pub position: Option<f64>,
}

/// A reshaped row: `{<dimension>: <value>, ..., clicks, impressions, ctr, position}`.
///
/// Dimension columns serialize in the order they were requested.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRow {
    pub dimensions: Vec<(String, String)>,
    pub clicks: u64,
    pub impressions: u64,
    pub ctr: f64,
    /// Average ranking, 1-based.
    pub position: f64,
}

impl AnalyticsRow {
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|(dimension, _)| dimension == name)
            .map(|(_, value)| value.as_str())
    }
}

impl Serialize for AnalyticsRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dimensions.len() + 4))?;
        for (dimension, value) in &self.dimensions {
            map.serialize_entry(dimension, value)?;
        }
        map.serialize_entry("clicks", &self.clicks)?;
        map.serialize_entry("impressions", &self.impressions)?;
        map.serialize_entry("ctr", &self.ctr)?;
        map.serialize_entry("position", &self.position)?;
        map.end()
    }
}

/// Result of the `search_analytics` tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnalyticsReport {
    pub rows: Vec<AnalyticsRow>,
    pub response_aggregation_type: String,
}

impl SearchAnalyticsReport {
    /// Zip each row's keys against the requested dimension names by index,
    /// stopping at the shorter of the two. Missing metrics read as 0, so an
    /// omitted field and an explicit zero are indistinguishable.
    pub fn reshape(response: SearchAnalyticsQueryResponse, dimensions: &[String]) -> Self {
        let rows = response
            .rows
            .into_iter()
            .map(|row| AnalyticsRow {
                dimensions: dimensions
                    .iter()
                    .cloned()
                    .zip(row.keys)
                    .collect(),
                clicks: count(row.clicks),
                impressions: count(row.impressions),
                ctr: row.ctr.unwrap_or(0.0),
                position: row.position.unwrap_or(0.0),
            })
            .collect();

        Self {
            rows,
            response_aggregation_type: response.response_aggregation_type.unwrap_or_default(),
        }
    }
}

fn count(value: Option<f64>) -> u64 {
    value.map(|v| v.max(0.0).round() as u64).unwrap_or(0)
}
