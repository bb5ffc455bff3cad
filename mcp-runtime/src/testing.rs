//! In-memory backend for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use gsc_core::GscError;
use gsc_core::analytics::{SearchAnalyticsQueryBody, SearchAnalyticsQueryResponse};
use gsc_core::sites::{SiteEntry, SitesListResponse};

use crate::analytics::SearchConsoleBackend;

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    ListSites,
    SearchAnalytics {
        site_url: String,
        body: SearchAnalyticsQueryBody,
    },
}

#[derive(Debug, Default)]
pub struct StubBackend {
    sites: SitesListResponse,
    analytics: SearchAnalyticsQueryResponse,
    failure: Option<GscError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl StubBackend {
    pub fn with_site(site_url: &str, permission_level: &str) -> Self {
        Self {
            sites: SitesListResponse {
                site_entry: vec![SiteEntry {
                    site_url: Some(site_url.to_string()),
                    permission_level: Some(permission_level.to_string()),
                }],
            },
            ..Default::default()
        }
    }

    pub fn with_analytics(analytics: SearchAnalyticsQueryResponse) -> Self {
        Self {
            analytics,
            ..Default::default()
        }
    }

    pub fn failing(error: GscError) -> Self {
        Self {
            failure: Some(error),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RecordedCall) -> Result<(), GscError> {
        self.calls.lock().unwrap().push(call);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchConsoleBackend for StubBackend {
    async fn list_sites(&self) -> Result<SitesListResponse, GscError> {
        self.record(RecordedCall::ListSites)?;
        Ok(self.sites.clone())
    }

    async fn query_search_analytics(
        &self,
        site_url: &str,
        body: &SearchAnalyticsQueryBody,
    ) -> Result<SearchAnalyticsQueryResponse, GscError> {
        self.record(RecordedCall::SearchAnalytics {
            site_url: site_url.to_string(),
            body: body.clone(),
        })?;
        Ok(self.analytics.clone())
    }
}
