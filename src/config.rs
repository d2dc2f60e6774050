use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const HOME_ENV_VAR: &str = "LINKEDIN_POST_HOME";
const SETTINGS_FILE: &str = "settings.toml";
const CREDENTIALS_FILE: &str = "credentials.json";

const DEFAULT_AUTHORIZATION_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const DEFAULT_TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const DEFAULT_API_BASE_URL: &str = "https://api.linkedin.com";
const DEFAULT_SCOPES: &str = "openid profile w_member_social";
const DEFAULT_CALLBACK_PORT: u16 = 8000;

/// Runtime knobs. Everything has a default; `settings.toml` in the home
/// directory may override any subset of them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub home: PathBuf,
    pub callback_port: u16,
    pub callback_path: String,
    pub callback_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub authorization_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scopes: String,
    pub open_browser: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home: PathBuf::new(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_path: "/callback".to_string(),
            callback_timeout_secs: 120,
            request_timeout_secs: 30,
            authorization_url: DEFAULT_AUTHORIZATION_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            open_browser: true,
        }
    }
}

impl Settings {
    pub fn load(home: &Path) -> AppResult<Self> {
        let settings_file = home.join(SETTINGS_FILE);
        let mut settings = if settings_file.exists() {
            let contents = fs::read_to_string(&settings_file)?;
            toml::from_str::<Settings>(&contents).map_err(|e| AppError::CorruptConfig {
                path: settings_file.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            Settings::default()
        };

        if !settings.callback_path.starts_with('/') {
            settings.callback_path = format!("/{}", settings.callback_path);
        }
        settings.home = home.to_path_buf();
        Ok(settings)
    }

    /// Must match the redirect URL registered on the LinkedIn app exactly.
    pub fn redirect_uri(&self) -> String {
        format!(
            "http://localhost:{}{}",
            self.callback_port, self.callback_path
        )
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.home.join(CREDENTIALS_FILE)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn default_home() -> AppResult<PathBuf> {
    resolve_home(std::env::var(HOME_ENV_VAR).ok(), dirs::config_dir())
}

fn resolve_home(overridden: Option<String>, config_dir: Option<PathBuf>) -> AppResult<PathBuf> {
    if let Some(home) = overridden.filter(|home| !home.is_empty()) {
        return Ok(PathBuf::from(home));
    }

    config_dir.map(|dir| dir.join("linkedin-post")).ok_or_else(|| {
        AppError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Could not find a configuration directory; set {}", HOME_ENV_VAR),
        ))
    })
}
