use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, remove_file};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::auth::token_data::TokenData;
use crate::error::{AppError, AppResult};

/// Everything the CLI remembers between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: None,
            token_expiry: None,
        }
    }

    pub fn has_keys(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// A cached token that is present and not past its expiry.
    /// Tokens without a recorded expiry are assumed live until the API says otherwise.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        match self.token_expiry {
            Some(expiry) if expiry <= now => None,
            _ => Some(token),
        }
    }

    pub fn set_token(&mut self, tokens: &TokenData) {
        self.access_token = Some(tokens.access_token.clone());
        self.token_expiry = tokens.expires_at;
    }

    pub fn clear_token(&mut self) {
        self.access_token = None;
        self.token_expiry = None;
    }
}

/// Sole owner of the credentials file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> AppResult<Option<Credentials>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| AppError::CorruptConfig {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })
    }

    /// Writes to a sibling temp file and renames it over the old one, so an
    /// interrupted run never leaves a half-written file behind.
    pub fn save(&self, credentials: &Credentials) -> AppResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // NamedTempFile is created 0600 on unix, and rename keeps the mode.
        let mut file = NamedTempFile::new_in(parent)?;
        let json_string = serde_json::to_string_pretty(credentials)
            .map_err(|e| AppError::Io(e.into()))?;
        file.write_all(json_string.as_bytes())?;
        file.flush()?;
        file.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(file.path(), fs::Permissions::from_mode(0o600))?;
        }

        file.persist(&self.path).map_err(|e| AppError::Io(e.error))?;
        log::debug!("Saved credentials to {}", self.path.display());
        Ok(())
    }

    /// Drops the cached token but keeps the client id and secret.
    pub fn clear_token(&self) -> AppResult<()> {
        if let Some(mut credentials) = self.load()? {
            credentials.clear_token();
            self.save(&credentials)?;
        }
        Ok(())
    }

    /// Removes the whole file. Returns whether there was one.
    pub fn clear_all(&self) -> AppResult<bool> {
        match remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn sample() -> Credentials {
        Credentials {
            client_id: "client-123".to_string(),
            client_secret: "secret-456".to_string(),
            access_token: Some("AQX-token".to_string()),
            token_expiry: Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap()),
        }
    }

    #[test]
    fn test_load_missing_file_is_none() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("nested").join("credentials.json"));

        for credentials in [sample(), Credentials::new("id", "secret")] {
            store.save(&credentials).unwrap();
            assert_eq!(store.load().unwrap(), Some(credentials));
        }
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "{ not json").unwrap();

        let err = CredentialStore::new(&path).load().unwrap_err();
        assert!(matches!(err, AppError::CorruptConfig { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&sample()).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&sample()).unwrap();
        store.save(&sample()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_clear_token_keeps_keys() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&sample()).unwrap();

        store.clear_token().unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.client_id, "client-123");
        assert_eq!(loaded.client_secret, "secret-456");
        assert_eq!(loaded.access_token, None);
        assert_eq!(loaded.token_expiry, None);
    }

    #[test]
    fn test_clear_all_removes_record() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store.save(&sample()).unwrap();

        assert!(store.clear_all().unwrap());
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.clear_all().unwrap());
    }

    #[test]
    fn test_usable_token_respects_expiry() {
        let now = Utc::now();
        let mut credentials = sample();

        credentials.token_expiry = Some(now + Duration::hours(1));
        assert_eq!(credentials.usable_token(now), Some("AQX-token"));

        credentials.token_expiry = Some(now - Duration::seconds(1));
        assert_eq!(credentials.usable_token(now), None);

        credentials.token_expiry = None;
        assert_eq!(credentials.usable_token(now), Some("AQX-token"));

        credentials.access_token = None;
        assert_eq!(credentials.usable_token(now), None);
    }
}
