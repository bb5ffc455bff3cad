use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Pick the service-account key file: the explicit path wins, otherwise
/// `GOOGLE_APPLICATION_CREDENTIALS`. `None` means run without a client.
pub fn resolve_credentials_path(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_credentials_path_from(explicit, std::env::var_os(CREDENTIALS_ENV))
}

pub(crate) fn resolve_credentials_path_from(
    explicit: Option<&Path>,
    env_value: Option<OsString>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        // An explicit path that is wrong is not silently replaced by the env.
        if path.exists() {
            tracing::info!(path = %path.display(), "using credentials from --credentials");
            return Some(path.to_path_buf());
        }
        tracing::error!(path = %path.display(), "credentials file not found");
        return None;
    }

    let env_path = env_value
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);
    match env_path {
        Some(path) if path.exists() => {
            tracing::info!(path = %path.display(), "using credentials from {CREDENTIALS_ENV}");
            Some(path)
        }
        Some(path) => {
            tracing::error!(path = %path.display(), "{CREDENTIALS_ENV} points at a missing file");
            None
        }
        None => {
            tracing::warn!(
                "no credentials configured; set {CREDENTIALS_ENV} or pass --credentials"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins_over_env() {
        let explicit = tempfile::NamedTempFile::new().unwrap();
        let from_env = tempfile::NamedTempFile::new().unwrap();

        let resolved = resolve_credentials_path_from(
            Some(explicit.path()),
            Some(from_env.path().as_os_str().to_owned()),
        );
        assert_eq!(resolved.as_deref(), Some(explicit.path()));
    }

    #[test]
    fn missing_explicit_path_does_not_fall_back() {
        let from_env = tempfile::NamedTempFile::new().unwrap();
        let resolved = resolve_credentials_path_from(
            Some(Path::new("/nonexistent/gsc-key.json")),
            Some(from_env.path().as_os_str().to_owned()),
        );
        assert_eq!(resolved, None);
    }

    #[test]
    fn env_path_is_used_when_present() {
        let from_env = tempfile::NamedTempFile::new().unwrap();
        let resolved =
            resolve_credentials_path_from(None, Some(from_env.path().as_os_str().to_owned()));
        assert_eq!(resolved.as_deref(), Some(from_env.path()));
    }

    #[test]
    fn empty_or_missing_env_means_unavailable() {
        assert_eq!(resolve_credentials_path_from(None, Some(OsString::new())), None);
        assert_eq!(resolve_credentials_path_from(None, None), None);
        assert_eq!(
            resolve_credentials_path_from(None, Some(OsString::from("/nonexistent/key.json"))),
            None
        );
    }
}
