use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

/// What a successful authorization hands back to the caller.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenData {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Present when the `openid` scope was granted.
    pub id_token: Option<IdTokenInfo>,
}

/// Body of a successful token endpoint response.
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token_data(self, now: DateTime<Utc>) -> TokenData {
        let expires_at = self.expires_in.filter(|secs| *secs > 0).and_then(|secs| {
            let at = Duration::try_seconds(secs).and_then(|d| now.checked_add_signed(d));
            if at.is_none() {
                log::warn!(
                    "Ignoring out-of-range expires_in {}; treating the token as non-expiring",
                    secs
                );
            }
            at
        });

        // The id_token is only used for display, so a malformed one is not fatal.
        let id_token = self.id_token.as_deref().and_then(|jwt| match parse_id_token(jwt) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("Ignoring unparsable id_token: {}", e);
                None
            }
        });

        TokenData {
            access_token: self.access_token,
            expires_at,
            id_token,
        }
    }
}

/// Flat subset of the OpenID claims LinkedIn puts in the id_token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdTokenInfo {
    pub sub: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub raw_jwt: String,
}

impl IdTokenInfo {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.email.as_deref())
    }
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Invalid JWT format")]
    InvalidJwt,
    #[error("Failed to decode base64: {0}")]
    Base64Error(#[from] base64::DecodeError),
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Decodes the payload without verifying the signature; nothing here is
/// used for an authorization decision.
pub fn parse_id_token(jwt: &str) -> Result<IdTokenInfo, TokenError> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::InvalidJwt);
    }

    let payload_bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)?;

    let claim = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    Ok(IdTokenInfo {
        sub: claim("sub"),
        name: claim("name"),
        email: claim("email"),
        raw_jwt: jwt.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with(payload: serde_json::Value) -> String {
        let header = serde_json::json!({"alg": "none", "typ": "JWT"});
        let header_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&header).unwrap());
        let payload_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&payload).unwrap());
        let signature_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"sig");
        format!("{}.{}.{}", header_b64, payload_b64, signature_b64)
    }

    #[test]
    fn test_parse_valid_jwt() {
        let jwt = jwt_with(serde_json::json!({
            "sub": "782bbtaQ",
            "name": "Ada Lovelace",
            "email": "ada@example.com"
        }));

        let info = parse_id_token(&jwt).unwrap();
        assert_eq!(info.sub.as_deref(), Some("782bbtaQ"));
        assert_eq!(info.display_name(), Some("Ada Lovelace"));
        assert_eq!(info.raw_jwt, jwt);
    }

    #[test]
    fn test_parse_rejects_non_jwt() {
        assert!(matches!(
            parse_id_token("not-a-jwt"),
            Err(TokenError::InvalidJwt)
        ));
    }

    #[test]
    fn test_token_response_computes_expiry() {
        let now = Utc::now();
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "AQV",
            "expires_in": 5184000,
            "scope": "openid,profile,w_member_social"
        }))
        .unwrap();

        let data = response.into_token_data(now);
        assert_eq!(data.access_token, "AQV");
        assert_eq!(data.expires_at, Some(now + Duration::seconds(5184000)));
        assert_eq!(data.id_token, None);
    }

    #[test]
    fn test_out_of_range_expires_in_means_no_expiry() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "AQV",
            "expires_in": i64::MAX
        }))
        .unwrap();

        let data = response.into_token_data(Utc::now());
        assert_eq!(data.access_token, "AQV");
        assert_eq!(data.expires_at, None);

        // Fits in a Duration but lands past the latest representable date.
        let response = TokenResponse {
            access_token: "AQV".into(),
            expires_in: Some(i64::MAX / 1_000),
            id_token: None,
        };
        assert_eq!(response.into_token_data(Utc::now()).expires_at, None);
    }

    #[test]
    fn test_bad_id_token_is_ignored() {
        let response = TokenResponse {
            access_token: "AQV".into(),
            expires_in: None,
            id_token: Some("garbage".into()),
        };

        let data = response.into_token_data(Utc::now());
        assert_eq!(data.expires_at, None);
        assert_eq!(data.id_token, None);
    }
}
