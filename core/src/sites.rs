use serde::{Deserialize, Serialize};

/// Raw `sites.list` payload as returned by the Search Console API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitesListResponse {
    #[serde(default)]
    pub site_entry: Vec<SiteEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    #[serde(default)]
    pub site_url: Option<String>,
    /// e.g. "siteOwner", "siteFullUser", "siteRestrictedUser", "siteUnverifiedUser"
    #[serde(default)]
    pub permission_level: Option<String>,
}

/// A web property the service identity can read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub site_url: String,
    pub permission_level: String,
}

/// Result of the `list_sites` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteList {
    pub sites: Vec<Site>,
    pub total_sites: usize,
}

impl SiteList {
    /// Flatten the backend entries, keeping their order. Missing fields become `""`.
    pub fn from_response(response: SitesListResponse) -> Self {
        let sites: Vec<Site> = response
            .site_entry
            .into_iter()
            .map(|entry| Site {
                site_url: entry.site_url.unwrap_or_default(),
                permission_level: entry.permission_level.unwrap_or_default(),
            })
            .collect();
        Self {
            total_sites: sites.len(),
            sites,
        }
    }
}
