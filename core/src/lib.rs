//! Shared types for the Search Console MCP server: the analytics data
//! model, the tool-call error taxonomy, and service-account credentials.

pub mod analytics;
pub mod credentials;
pub mod error;
pub mod sites;

pub use error::GscError;
