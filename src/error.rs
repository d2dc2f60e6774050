use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Every failure a single invocation can end with. None of them are retried.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration file {path} is corrupt: {reason}. Fix or delete it")]
    CorruptConfig { path: String, reason: String },

    #[error(
        "Port {port} is already in use ({reason}). Stop whatever is listening on it and try again"
    )]
    PortUnavailable { port: u16, reason: String },

    #[error("Authorization was denied by the provider: {error}{}", describe(.description))]
    AuthDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Timed out after {0}s waiting for the authorization callback. Run the command again")]
    AuthTimeout(u64),

    #[error("Authorization callback carried an unexpected state value; aborting login")]
    StateMismatch,

    #[error("Token exchange failed ({status}): {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Access token was rejected. Re-run with --reset-auth to log in again")]
    Unauthorized,

    #[error("LinkedIn rejected the request ({status}): {body}")]
    ProviderRejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Interrupted")]
    Interrupted,
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" ({d})"),
        _ => String::new(),
    }
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InvalidInput(_) => 2,
            AppError::CorruptConfig { .. } => 3,
            AppError::PortUnavailable { .. } => 4,
            AppError::AuthDenied { .. } => 5,
            AppError::AuthTimeout(_) => 6,
            AppError::StateMismatch => 7,
            AppError::TokenExchangeFailed { .. } => 8,
            AppError::Unauthorized => 9,
            AppError::ProviderRejected { .. } => 10,
            AppError::Network(_) => 11,
            AppError::Io(_) => 12,
            AppError::Interrupted => 130,
        }
    }
}

/// Process exit status for a finished run. Errors that are not an `AppError`
/// (even under added context) exit with 1.
pub fn exit_status<T>(result: &anyhow::Result<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(err) => err
            .downcast_ref::<AppError>()
            .map(AppError::exit_code)
            .unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_and_non_zero() {
        let errors = [
            AppError::InvalidInput("x".into()),
            AppError::CorruptConfig {
                path: "p".into(),
                reason: "r".into(),
            },
            AppError::PortUnavailable {
                port: 8000,
                reason: "r".into(),
            },
            AppError::AuthDenied {
                error: "access_denied".into(),
                description: None,
            },
            AppError::AuthTimeout(120),
            AppError::StateMismatch,
            AppError::TokenExchangeFailed {
                status: 400,
                body: "b".into(),
            },
            AppError::Unauthorized,
            AppError::ProviderRejected {
                status: 429,
                body: "b".into(),
            },
            AppError::Io(std::io::Error::other("x")),
            AppError::Interrupted,
        ];

        let mut codes: Vec<u8> = errors.iter().map(AppError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        let len = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len);
    }

    #[test]
    fn test_auth_denied_message_keeps_provider_error() {
        let err = AppError::AuthDenied {
            error: "access_denied".into(),
            description: Some("The user cancelled".into()),
        };
        assert_eq!(
            err.to_string(),
            "Authorization was denied by the provider: access_denied (The user cancelled)"
        );
    }

    #[test]
    fn test_exit_status_sees_through_context() {
        use anyhow::Context;

        let ok: anyhow::Result<()> = Ok(());
        assert_eq!(exit_status(&ok), 0);

        let wrapped: anyhow::Result<()> =
            Err(AppError::StateMismatch).context("while logging in");
        assert_eq!(exit_status(&wrapped), 7);

        let foreign: anyhow::Result<()> = Err(anyhow::anyhow!("something else"));
        assert_eq!(exit_status(&foreign), 1);
    }

    #[test]
    fn test_unauthorized_names_remedy() {
        assert!(AppError::Unauthorized.to_string().contains("--reset-auth"));
    }
}
