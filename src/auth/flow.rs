use std::io;

use base64::{engine::general_purpose, Engine};
use chrono::Utc;
use subtle::ConstantTimeEq;
use url::Url;

use crate::auth::auth_storage::Credentials;
use crate::auth::oauth_server::CallbackListener;
use crate::auth::token_data::{TokenData, TokenResponse};
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::interrupt::InterruptGuard;

/// Whatever shows the consent page to the user.
pub trait BrowserLauncher {
    fn open(&self, url: &str) -> io::Result<()>;
}

pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        webbrowser::open(url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingCallback,
    ExchangingCode,
    Complete,
    Failed,
}

/// One run of the authorization-code flow against the provider.
pub struct AuthFlow<'a> {
    settings: &'a Settings,
    http: &'a reqwest::blocking::Client,
    launcher: &'a dyn BrowserLauncher,
    interrupts: InterruptGuard,
    state: FlowState,
}

impl<'a> AuthFlow<'a> {
    pub fn new(
        settings: &'a Settings,
        http: &'a reqwest::blocking::Client,
        launcher: &'a dyn BrowserLauncher,
    ) -> Self {
        Self {
            settings,
            http,
            launcher,
            interrupts: InterruptGuard::default(),
            state: FlowState::Idle,
        }
    }

    pub fn with_interrupts(mut self, interrupts: InterruptGuard) -> Self {
        self.interrupts = interrupts;
        self
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Runs the flow to completion. The caller is responsible for persisting
    /// the returned token.
    pub fn run(&mut self, credentials: &Credentials) -> AppResult<TokenData> {
        let result = self.drive(credentials);
        if result.is_err() {
            self.transition(FlowState::Failed);
        }
        result
    }

    fn drive(&mut self, credentials: &Credentials) -> AppResult<TokenData> {
        let redirect_uri = self.settings.redirect_uri();
        let listener =
            CallbackListener::bind(self.settings.callback_port, &self.settings.callback_path)?;

        let csrf_state = generate_state();
        let auth_url = authorization_url(
            self.settings,
            &credentials.client_id,
            &redirect_uri,
            &csrf_state,
        )?;
        self.transition(FlowState::AwaitingCallback);

        eprintln!("Opening browser for authorization...\n{}", auth_url);
        if self.settings.open_browser {
            if let Err(e) = self.launcher.open(auth_url.as_str()) {
                log::warn!("Failed to open browser: {}", e);
            }
        }

        let callback = {
            let _armed = self.interrupts.arm(listener.shutdown_handle());
            listener.await_callback(self.settings.callback_timeout(), &csrf_state)?
        };

        let returned_state = callback.state.as_deref().unwrap_or_default();
        if !states_match(returned_state, &csrf_state) {
            log::error!("Callback state did not match; possible forged redirect");
            return Err(AppError::StateMismatch);
        }

        self.transition(FlowState::ExchangingCode);
        let tokens = exchange_code_for_tokens(
            self.http,
            &self.settings.token_url,
            credentials,
            &callback.code,
            &redirect_uri,
        )?;

        self.transition(FlowState::Complete);
        Ok(tokens)
    }

    fn transition(&mut self, next: FlowState) {
        log::debug!("Authorization flow: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

fn authorization_url(
    settings: &Settings,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> AppResult<Url> {
    let mut auth_url = Url::parse(&settings.authorization_url).map_err(|e| {
        AppError::InvalidInput(format!(
            "invalid authorization_url {:?}: {}",
            settings.authorization_url, e
        ))
    })?;

    auth_url
        .query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &settings.scopes)
        .append_pair("state", state);

    Ok(auth_url)
}

fn exchange_code_for_tokens(
    http: &reqwest::blocking::Client,
    token_url: &str,
    credentials: &Credentials,
    code: &str,
    redirect_uri: &str,
) -> AppResult<TokenData> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
    ];

    let response = http.post(token_url).form(&params).send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(AppError::TokenExchangeFailed {
            status: status.as_u16(),
            body,
        });
    }

    let token_response: TokenResponse =
        serde_json::from_str(&body).map_err(|e| AppError::TokenExchangeFailed {
            status: status.as_u16(),
            body: format!("unexpected token response ({}): {}", e, body),
        })?;

    Ok(token_response.into_token_data(Utc::now()))
}

pub(crate) fn states_match(returned: &str, expected: &str) -> bool {
    returned.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn generate_state() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
