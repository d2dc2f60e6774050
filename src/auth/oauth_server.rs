use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tiny_http::{Header, Method, Request, Response, Server};
use url::Url;

use super::flow::states_match;
use crate::error::{AppError, AppResult};

const SUCCESS_HTML: &str = "<html><body><h1>Authorization successful!</h1><p>You can close this tab and return to the terminal.</p></body></html>";
const DENIED_HTML: &str = "<html><body><h1>Authorization failed</h1><p>Return to the terminal for details.</p></body></html>";
const MISSING_CODE_HTML: &str = "<html><body><h1>Authorization failed</h1><p>The redirect carried no authorization code.</p></body></html>";
const STATE_MISMATCH_HTML: &str = "<html><body><h1>Authorization failed</h1><p>The redirect did not come from this login attempt. Return to the terminal for details.</p></body></html>";
const NOT_FOUND_HTML: &str = "<html><body><h1>Not found</h1></body></html>";
const METHOD_NOT_ALLOWED_HTML: &str = "<html><body><h1>Method not allowed</h1><p>The callback only accepts GET requests.</p></body></html>";

/// Query parameters of a callback that carried an authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// What one inbound request means for the wait.
enum Outcome {
    Continue,
    Code(CallbackParams),
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// A bound, not yet used, redirect listener. `await_callback` consumes it, so
/// a listener serves at most one authorization attempt and its socket is
/// closed as soon as the wait ends.
pub struct CallbackListener {
    server: Arc<Server>,
    port: u16,
    path: String,
    shutdown_flag: Arc<AtomicBool>,
}

/// Lets another thread abort a pending `await_callback`.
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown_flag: Arc<AtomicBool>,
    server: Weak<Server>,
}

impl ShutdownHandle {
    pub fn cancel(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        if let Some(server) = self.server.upgrade() {
            server.unblock();
        }
    }
}

impl CallbackListener {
    pub fn bind(port: u16, path: &str) -> AppResult<Self> {
        let server = Server::http(("127.0.0.1", port)).map_err(|e| AppError::PortUnavailable {
            port,
            reason: e.to_string(),
        })?;
        log::debug!("Callback listener bound on 127.0.0.1:{}{}", port, path);

        Ok(Self {
            server: Arc::new(server),
            port,
            path: path.to_string(),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown_flag: self.shutdown_flag.clone(),
            server: Arc::downgrade(&self.server),
        }
    }

    /// Waits for the first callback carrying a `code` or an `error`.
    /// `expected_state` only decides which page the browser is shown; the
    /// caller still has to check `CallbackParams::state` itself.
    pub fn await_callback(
        self,
        timeout: Duration,
        expected_state: &str,
    ) -> AppResult<CallbackParams> {
        let deadline = Instant::now() + timeout;

        loop {
            if self.shutdown_flag.load(Ordering::SeqCst) {
                return Err(AppError::Interrupted);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AppError::AuthTimeout(timeout.as_secs()));
            }

            let received = self.server.recv_timeout(remaining);
            if self.shutdown_flag.load(Ordering::SeqCst) {
                log::debug!("Callback wait cancelled");
                return Err(AppError::Interrupted);
            }

            let request = match received {
                Ok(Some(request)) => request,
                Ok(None) => return Err(AppError::AuthTimeout(timeout.as_secs())),
                Err(e) => return Err(AppError::Io(e)),
            };

            match self.handle_request(request, expected_state) {
                Outcome::Continue => continue,
                Outcome::Code(params) => return Ok(params),
                Outcome::Denied { error, description } => {
                    return Err(AppError::AuthDenied { error, description })
                }
            }
        }
    }

    fn handle_request(&self, request: Request, expected_state: &str) -> Outcome {
        let parsed_url = match Url::parse(&format!("http://localhost{}", request.url())) {
            Ok(url) => url,
            Err(e) => {
                log::debug!("Ignoring request with unparsable target {:?}: {}", request.url(), e);
                respond(request, NOT_FOUND_HTML, 400);
                return Outcome::Continue;
            }
        };

        if parsed_url.path() != self.path {
            log::debug!("Ignoring request for {}", parsed_url.path());
            respond(request, NOT_FOUND_HTML, 404);
            return Outcome::Continue;
        }

        if *request.method() != Method::Get {
            respond(request, METHOD_NOT_ALLOWED_HTML, 405);
            return Outcome::Continue;
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut error_description = None;

        for (key, value) in parsed_url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            respond(request, DENIED_HTML, 400);
            return Outcome::Denied {
                error,
                description: error_description,
            };
        }

        match code {
            Some(code) if !code.is_empty() => {
                if states_match(state.as_deref().unwrap_or_default(), expected_state) {
                    respond(request, SUCCESS_HTML, 200);
                } else {
                    respond(request, STATE_MISMATCH_HTML, 400);
                }
                Outcome::Code(CallbackParams { code, state })
            }
            _ => {
                respond(request, MISSING_CODE_HTML, 400);
                Outcome::Continue
            }
        }
    }
}

fn respond(request: Request, body: &str, status: u16) {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response = response.with_header(header);
    }
    if let Err(e) = request.respond(response) {
        log::debug!("Failed to answer callback request: {}", e);
    }
}
