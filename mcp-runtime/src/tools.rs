//! Tool registry and dispatcher.
//!
//! The untyped `arguments` bag of a `tools/call` stops here: it is checked
//! and converted into a [`ToolRequest`] before the analytics client sees it.

use std::sync::LazyLock;

use gsc_core::GscError;
use gsc_core::analytics::{DEFAULT_ROW_LIMIT, SearchAnalyticsRequest};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::analytics::AnalyticsClient;

pub const LIST_SITES: &str = "list_sites";
pub const SEARCH_ANALYTICS: &str = "search_analytics";

const SEARCH_ANALYTICS_REQUIRED: [&str; 3] = ["siteUrl", "startDate", "endDate"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

static TOOL_DESCRIPTORS: LazyLock<Vec<ToolDescriptor>> = LazyLock::new(|| {
    vec![
        ToolDescriptor {
            name: LIST_SITES,
            description: "List all sites configured in Google Search Console",
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        },
        ToolDescriptor {
            name: SEARCH_ANALYTICS,
            description: "Get search analytics data from Google Search Console",
            input_schema: json!({
                "type": "object",
                "required": SEARCH_ANALYTICS_REQUIRED,
                "properties": {
                    "siteUrl": {
                        "type": "string",
                        "description": "The URL of the site to get data for."
                    },
                    "startDate": {
                        "type": "string",
                        "description": "The start date for the data (YYYY-MM-DD)."
                    },
                    "endDate": {
                        "type": "string",
                        "description": "The end date for the data (YYYY-MM-DD)."
                    },
                    "dimensions": {
                        "type": "string",
                        "description": "Comma-separated list of dimensions to group by (query,page,country,device,searchAppearance)."
                    },
                    "type": {
                        "type": "string",
                        "description": "The type of search (web, image, video, news, discover, googleNews)."
                    },
                    "aggregationType": {
                        "type": "string",
                        "description": "The type of aggregation (auto, byPage, byProperty, byNewsShowcasePanel)."
                    },
                    "rowLimit": {
                        "type": "integer",
                        "description": "The maximum number of rows to return (default: 1000)."
                    }
                }
            }),
        },
    ]
});

/// Process-wide tool list, identical for every session.
pub fn tool_descriptors() -> &'static [ToolDescriptor] {
    &TOOL_DESCRIPTORS
}

/// A single `tools/call` as received from the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool_name: String,
    pub arguments: Option<Map<String, Value>>,
}

impl Invocation {
    pub fn new(tool_name: impl Into<String>, arguments: Option<Map<String, Value>>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
}

impl ToolResult {
    /// One text item holding `value` as 2-space pretty-printed JSON.
    pub fn json<T: Serialize>(value: &T) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: to_pretty_json(value),
            }],
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.content.first().map(|item| match item {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// An invocation after its arguments were checked against the tool's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    ListSites,
    SearchAnalytics(SearchAnalyticsRequest),
}

impl ToolRequest {
    pub fn parse(invocation: &Invocation) -> Result<Self, GscError> {
        let empty = Map::new();
        let args = invocation.arguments.as_ref().unwrap_or(&empty);

        match invocation.tool_name.as_str() {
            LIST_SITES => Ok(ToolRequest::ListSites),
            SEARCH_ANALYTICS => parse_search_analytics(args).map(ToolRequest::SearchAnalytics),
            other => Err(GscError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_search_analytics(args: &Map<String, Value>) -> Result<SearchAnalyticsRequest, GscError> {
    let site_url = arg_optional_string(args, "siteUrl")?;
    let start_date = arg_optional_string(args, "startDate")?;
    let end_date = arg_optional_string(args, "endDate")?;

    match (site_url, start_date, end_date) {
        (Some(site_url), Some(start_date), Some(end_date)) => Ok(SearchAnalyticsRequest {
            site_url,
            start_date,
            end_date,
            dimensions: arg_dimensions(args, "dimensions")?,
            search_type: arg_optional_string(args, "type")?,
            aggregation_type: arg_optional_string(args, "aggregationType")?,
            row_limit: Some(arg_optional_u64(args, "rowLimit")?.unwrap_or(DEFAULT_ROW_LIMIT)),
        }),
        (site_url, start_date, end_date) => {
            let missing: Vec<&str> = SEARCH_ANALYTICS_REQUIRED
                .into_iter()
                .zip([site_url.is_none(), start_date.is_none(), end_date.is_none()])
                .filter_map(|(key, absent)| absent.then_some(key))
                .collect();
            Err(GscError::validation(format!(
                "Missing required parameters: {}",
                missing.join(", ")
            )))
        }
    }
}

/// `None` for absent, null, or blank strings.
fn arg_optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>, GscError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(v)) if v.trim().is_empty() => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(GscError::invalid_field(
            key,
            format!("'{key}' must be a string"),
        )),
    }
}

fn arg_optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, GscError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| {
                GscError::invalid_field(key, format!("'{key}' must be a non-negative integer"))
            })
            .map(Some),
        Some(_) => Err(GscError::invalid_field(
            key,
            format!("'{key}' must be a non-negative integer"),
        )),
    }
}

/// Comma-separated on the wire. Segments are trimmed and blanks dropped;
/// a list that ends up empty means no grouping was requested.
fn arg_dimensions(args: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>, GscError> {
    let Some(raw) = args.get(key) else {
        return Ok(None);
    };
    let raw = match raw {
        Value::Null => return Ok(None),
        Value::String(raw) => raw,
        _ => {
            return Err(GscError::invalid_field(
                key,
                format!("'{key}' must be a comma-separated string, e.g. \"query,page\""),
            ));
        }
    };

    let dimensions: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    Ok((!dimensions.is_empty()).then_some(dimensions))
}

/// Routes invocations to the analytics client.
///
/// Whether a client exists is decided once, at construction, from credential
/// availability. Without one every call fails with [`GscError::NotInitialized`]
/// while discovery keeps working.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    client: Option<AnalyticsClient>,
}

impl ToolDispatcher {
    pub fn new(client: AnalyticsClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    pub fn uninitialized() -> Self {
        Self { client: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    pub fn list_tools(&self) -> &'static [ToolDescriptor] {
        tool_descriptors()
    }

    pub async fn call_tool(&self, invocation: &Invocation) -> Result<ToolResult, GscError> {
        let client = self.client.as_ref().ok_or(GscError::NotInitialized)?;

        match ToolRequest::parse(invocation)? {
            ToolRequest::ListSites => {
                let sites = client.list_sites().await?;
                Ok(ToolResult::json(&sites))
            }
            ToolRequest::SearchAnalytics(request) => {
                let report = client.get_search_analytics(request).await?;
                Ok(ToolResult::json(&report))
            }
        }
    }
}
