use std::io::{self, Read};

use chrono::Utc;

use crate::auth::{AuthFlow, BrowserLauncher, CredentialStore, Credentials};
use crate::cli::Cli;
use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::interrupt::InterruptGuard;
use crate::linkedin_client::{build_http_client, post_url, LinkedInClient};
use crate::post::{read_text, PostContent, TextSource, Visibility};

/// Asks the user for a value during first-time setup.
pub trait Prompter {
    fn prompt(&self, label: &str, secret: bool) -> io::Result<String>;
}

pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt(&self, label: &str, secret: bool) -> io::Result<String> {
        if secret {
            dialoguer::Password::new()
                .with_prompt(label)
                .interact()
                .map_err(io::Error::other)
        } else {
            dialoguer::Input::<String>::new()
                .with_prompt(label)
                .interact_text()
                .map_err(io::Error::other)
        }
    }
}

/// Everything a run touches outside its own arguments.
pub struct Environment<'a> {
    pub settings: Settings,
    pub stdin: &'a mut dyn Read,
    pub stdin_is_terminal: bool,
    pub prompter: &'a dyn Prompter,
    pub browser: &'a dyn BrowserLauncher,
    pub interrupts: InterruptGuard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub post_id: String,
    pub visibility: Visibility,
}

impl Published {
    pub fn url(&self) -> Option<String> {
        if self.post_id.is_empty() {
            None
        } else {
            Some(post_url(&self.post_id))
        }
    }
}

/// The whole command: resets, onboarding, input, token, publish.
pub fn run(cli: &Cli, env: &mut Environment<'_>) -> AppResult<Published> {
    let store = CredentialStore::new(env.settings.credentials_file());

    if cli.reset_keys {
        let _critical = env.interrupts.critical();
        if store.clear_all()? {
            log::info!("Cleared all saved credentials");
        }
    } else if cli.reset_auth {
        let _critical = env.interrupts.critical();
        store.clear_token()?;
        log::info!("Cleared saved access token");
    }

    let mut credentials = ensure_keys(&store, env)?;

    let source = cli.text_source();
    if source == TextSource::Stdin && env.stdin_is_terminal {
        eprintln!("Enter post text (Ctrl+D to send):");
    }
    let text = read_text(&source, env.stdin)?;
    let post = PostContent::new(&text, cli.visibility(), cli.image.clone())?;

    let http = build_http_client(env.settings.request_timeout())?;
    let mut client = authorized_client(&http, &store, &mut credentials, env)?;

    let image_urn = match &post.image_path {
        Some(path) => Some(client.upload_image(path)?),
        None => None,
    };

    let post_id = client.publish(&post, image_urn.as_deref())?;
    log::info!("Published share {}", post_id);

    Ok(Published {
        post_id,
        visibility: post.visibility,
    })
}

fn ensure_keys(store: &CredentialStore, env: &Environment<'_>) -> AppResult<Credentials> {
    let mut credentials = store.load()?.unwrap_or_default();
    if credentials.has_keys() {
        return Ok(credentials);
    }

    eprintln!(
        "\nFirst-time setup\n\
         ================\n\
         You need OAuth 2.0 credentials from the LinkedIn Developer Portal.\n\n\
         1. Create an app at https://www.linkedin.com/developers/apps/new\n   \
            (requires a Company Page)\n\
         2. Add products: Sign In with LinkedIn using OpenID Connect\n   \
            and Share on LinkedIn\n\
         3. In Auth -> Redirect URLs, add: {}\n\
         4. Copy the Client ID and Client Secret below\n",
        env.settings.redirect_uri()
    );

    // Ctrl-C here exits only after the prompt has restored the terminal.
    let _critical = env.interrupts.critical();
    if credentials.client_id.is_empty() {
        credentials.client_id = prompt_required(env.prompter, "Client ID", false)?;
    }
    if credentials.client_secret.is_empty() {
        credentials.client_secret = prompt_required(env.prompter, "Client Secret", true)?;
    }
    store.save(&credentials)?;
    Ok(credentials)
}

fn prompt_required(prompter: &dyn Prompter, label: &str, secret: bool) -> AppResult<String> {
    let value = prompter.prompt(label, secret)?.trim().to_string();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", label)));
    }
    Ok(value)
}

/// Reuses the cached token when the API still accepts it, otherwise runs the
/// browser flow and persists the new token.
fn authorized_client(
    http: &reqwest::blocking::Client,
    store: &CredentialStore,
    credentials: &mut Credentials,
    env: &Environment<'_>,
) -> AppResult<LinkedInClient> {
    let api_base_url = &env.settings.api_base_url;

    if let Some(token) = credentials.usable_token(Utc::now()) {
        let mut client = LinkedInClient::new(http.clone(), api_base_url, token);
        match client.user_id() {
            Ok(_) => return Ok(client),
            Err(AppError::Unauthorized) => {
                log::info!("Saved access token was rejected, re-authorizing");
            }
            Err(e) => return Err(e),
        }
    } else if credentials.access_token.is_some() {
        log::info!("Saved access token has expired, re-authorizing");
    }

    let mut flow = AuthFlow::new(&env.settings, http, env.browser)
        .with_interrupts(env.interrupts.clone());
    let tokens = flow.run(credentials)?;

    credentials.set_token(&tokens);
    {
        let _critical = env.interrupts.critical();
        store.save(credentials)?;
    }
    match tokens.id_token.as_ref().and_then(|info| info.display_name()) {
        Some(name) => eprintln!("Signed in as {}", name),
        None => eprintln!("Signed in"),
    }

    Ok(LinkedInClient::new(
        http.clone(),
        api_base_url,
        &tokens.access_token,
    ))
}
