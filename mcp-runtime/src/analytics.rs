//! Analytics client: validates queries, calls the backend, reshapes results.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gsc_core::GscError;
use gsc_core::analytics::{
    AnalyticsQuery, SearchAnalyticsQueryBody, SearchAnalyticsQueryResponse, SearchAnalyticsReport,
    SearchAnalyticsRequest,
};
use gsc_core::sites::{SiteList, SitesListResponse};

/// The two raw reporting operations the client needs. The production
/// implementation is [`crate::google::GoogleSearchConsole`]; tests inject a stub.
#[async_trait]
pub trait SearchConsoleBackend: Send + Sync + fmt::Debug {
    async fn list_sites(&self) -> Result<SitesListResponse, GscError>;

    async fn query_search_analytics(
        &self,
        site_url: &str,
        body: &SearchAnalyticsQueryBody,
    ) -> Result<SearchAnalyticsQueryResponse, GscError>;
}

#[derive(Clone, Debug)]
pub struct AnalyticsClient {
    backend: Arc<dyn SearchConsoleBackend>,
}

impl AnalyticsClient {
    pub fn new(backend: Arc<dyn SearchConsoleBackend>) -> Self {
        Self { backend }
    }

    pub async fn list_sites(&self) -> Result<SiteList, GscError> {
        let response = self.backend.list_sites().await?;
        let sites = SiteList::from_response(response);
        tracing::debug!(total_sites = sites.total_sites, "listed sites");
        Ok(sites)
    }

    /// Validation happens before the backend is touched.
    pub async fn get_search_analytics(
        &self,
        request: SearchAnalyticsRequest,
    ) -> Result<SearchAnalyticsReport, GscError> {
        let query = AnalyticsQuery::from_request(request)?;
        let body = query.to_request_body();

        tracing::debug!(
            site_url = %query.site_url,
            start_date = %body.start_date,
            end_date = %body.end_date,
            dimensions = ?body.dimensions,
            row_limit = body.row_limit,
            "querying search analytics"
        );

        let response = self
            .backend
            .query_search_analytics(&query.site_url, &body)
            .await?;
        let report = SearchAnalyticsReport::reshape(response, &query.dimensions);
        tracing::debug!(rows = report.rows.len(), "search analytics returned");
        Ok(report)
    }
}
