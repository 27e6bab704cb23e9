//! Google service-account authentication.
//!
//! Signs an RS256 JWT assertion with the service account key and exchanges it
//! at the OAuth token endpoint for a short-lived access token.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::SheetsError;
use crate::config::GoogleConfig;

/// OAuth scope granting read/write access to spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for the assertion (Google caps it at one hour).
const ASSERTION_TTL_SECS: i64 = 3600;

/// Access token obtained from the token endpoint.
#[derive(Debug, Clone)]
pub struct GoogleToken {
    pub access_token: SecretString,
    /// Unix timestamp when the access token expires.
    pub expires_at: i64,
}

impl GoogleToken {
    /// Check if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Consider expired if less than 60 seconds remaining
        now >= self.expires_at - 60
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Build the signed assertion for `config`.
///
/// # Errors
///
/// Returns `SheetsError::Auth` if the private key is not a valid RSA PEM.
pub fn sign_assertion(config: &GoogleConfig, now: i64) -> Result<String, SheetsError> {
    let key = EncodingKey::from_rsa_pem(config.private_key.expose_secret().as_bytes())
        .map_err(|e| SheetsError::Auth(format!("invalid service account key: {e}")))?;

    let claims = AssertionClaims {
        iss: &config.client_email,
        scope: SHEETS_SCOPE,
        aud: &config.token_uri,
        iat: now,
        exp: now + ASSERTION_TTL_SECS,
    };

    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| SheetsError::Auth(format!("cannot sign assertion: {e}")))
}

/// Exchange a service-account assertion for an access token.
///
/// # Errors
///
/// Returns `SheetsError::Auth` if the key is invalid or the token endpoint
/// rejects the assertion, `SheetsError::Http` on network failures.
#[instrument(skip(client, config), fields(service_account = %config.client_email))]
pub async fn fetch_token(
    client: &reqwest::Client,
    config: &GoogleConfig,
) -> Result<GoogleToken, SheetsError> {
    let now = chrono::Utc::now().timestamp();
    let assertion = sign_assertion(config, now)?;

    let response = client
        .post(&config.token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Obtained Google access token");
        return Ok(GoogleToken {
            access_token: SecretString::from(token.access_token),
            expires_at: now + token.expires_in,
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<TokenErrorResponse>(&body)
        .ok()
        .and_then(|e| e.error_description.or(e.error))
        .unwrap_or(body);

    Err(SheetsError::Auth(format!("HTTP {status}: {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_expired() {
        let now = chrono::Utc::now().timestamp();

        let expired = GoogleToken {
            access_token: SecretString::from("t"),
            expires_at: now - 10,
        };
        assert!(expired.is_expired());

        let fresh = GoogleToken {
            access_token: SecretString::from("t"),
            expires_at: now + 3600,
        };
        assert!(!fresh.is_expired());

        // Inside the 60s safety margin
        let nearly = GoogleToken {
            access_token: SecretString::from("t"),
            expires_at: now + 30,
        };
        assert!(nearly.is_expired());
    }

    #[test]
    fn test_sign_assertion_rejects_garbage_key() {
        let config = GoogleConfig {
            client_email: "sync@p.iam.gserviceaccount.com".to_string(),
            private_key: SecretString::from("not a pem"),
            token_uri: crate::config::DEFAULT_TOKEN_URI.to_string(),
            api_base: crate::config::DEFAULT_SHEETS_API_BASE.to_string(),
        };
        assert!(matches!(
            sign_assertion(&config, 0),
            Err(SheetsError::Auth(_))
        ));
    }
}
