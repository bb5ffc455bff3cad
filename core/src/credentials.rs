use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const WEBMASTERS_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/webmasters.readonly";
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google caps self-signed assertions at one hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credentials file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to read credentials file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Credentials are not a valid service account key: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unsupported credential type '{0}', expected 'service_account'")]
    UnsupportedType(String),
    #[error("Service account key is missing '{0}'")]
    MissingField(&'static str),
    #[error("Service account private key is not a valid RSA PEM: {0}")]
    InvalidPrivateKey(#[source] jsonwebtoken::errors::Error),
    #[error("Failed to sign service account assertion: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Clone, Deserialize)]
struct ServiceAccountFile {
    #[serde(rename = "type", default)]
    key_type: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// A pre-provisioned service identity, loaded once and never mutated.
#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    project_id: Option<String>,
    private_key_id: Option<String>,
    token_uri: String,
    signing_key: EncodingKey,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            return Err(CredentialError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CredentialError> {
        let file: ServiceAccountFile = serde_json::from_str(raw)?;

        if let Some(key_type) = file.key_type.as_deref() {
            if key_type != "service_account" {
                return Err(CredentialError::UnsupportedType(key_type.to_string()));
            }
        }
        if file.client_email.trim().is_empty() {
            return Err(CredentialError::MissingField("client_email"));
        }
        if file.private_key.trim().is_empty() {
            return Err(CredentialError::MissingField("private_key"));
        }

        let signing_key = EncodingKey::from_rsa_pem(file.private_key.as_bytes())
            .map_err(CredentialError::InvalidPrivateKey)?;

        Ok(Self {
            client_email: file.client_email,
            project_id: file.project_id,
            private_key_id: file.private_key_id,
            token_uri: file
                .token_uri
                .filter(|uri| !uri.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            signing_key,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Sign the RS256 JWT exchanged at `token_uri` for an access token
    /// (RFC 7523 jwt-bearer grant).
    pub fn assertion(&self, scope: &str, now: DateTime<Utc>) -> Result<String, CredentialError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let issued_at = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat: issued_at,
            exp: (now + Duration::seconds(ASSERTION_LIFETIME_SECS)).timestamp(),
        };

        jsonwebtoken::encode(&header, &claims, &self.signing_key).map_err(CredentialError::Signing)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}
