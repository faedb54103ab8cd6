//! Login, logout and password reset against the auth endpoints.

use crate::api::client::{authorize, error_detail};
use crate::api::types::{LoginResponse, PasswordResetErrors};
use crate::error::{AppError, ValidationError};
use crate::session::{KeyValueStore, TokenProvider, LOGIN_IDENTIFIER_KEY};
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    tokens: TokenProvider,
    store: Arc<dyn KeyValueStore>,
}

impl AuthClient {
    pub fn new(http: Client, base_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens: TokenProvider::new(store.clone()),
            store,
        }
    }

    pub fn tokens(&self) -> &TokenProvider {
        &self.tokens
    }

    pub fn login_identifier(&self) -> Option<String> {
        self.store.get(LOGIN_IDENTIFIER_KEY)
    }

    /// Logs in with a username or email and stores the returned token.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(), AppError> {
        let body = serde_json::json!({
            "username": identifier,
            "email": identifier,
            "password": password,
        });
        let response = self
            .http
            .post(format!("{}/api/auth/login/", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let parsed: LoginResponse = response.json().await.unwrap_or_default();

        if !status.is_success() {
            let message = login_error_message(status, &parsed);
            warn!("Login rejected with {}", status);
            return Err(AppError::LoginRejected(message));
        }

        let token = parsed
            .key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Server {
                status: status.as_u16(),
                detail: "Authentication successful, but no token received from server.".into(),
            })?;

        self.tokens.set(&SecretString::from(token))?;
        self.store.set(LOGIN_IDENTIFIER_KEY, identifier)?;
        info!("Logged in");
        Ok(())
    }

    /// Clears the local session. The server call is best effort.
    pub async fn logout(&self) -> Result<(), AppError> {
        if let Some(token) = self.tokens.get() {
            let url = format!("{}/api/auth/logout", self.base_url);
            let request = authorize(self.http.post(url), &token)?;
            match request.send().await {
                Ok(response) if response.status().is_success() => info!("Logged out on server"),
                Ok(response) => {
                    let (status, detail) = error_detail(response).await;
                    warn!("Server logout failed with {}: {}", status, detail);
                }
                Err(e) => warn!("Server logout request failed: {}", e.without_url()),
            }
        }
        self.tokens.clear()?;
        self.store.remove(LOGIN_IDENTIFIER_KEY)
    }

    /// Asks the server to mail a reset link.
    ///
    /// A 400 without an `email` complaint is reported as success so the
    /// response does not reveal whether an account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/api/auth/password/reset/", self.base_url))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::BAD_REQUEST {
            let errors: PasswordResetErrors = response.json().await.unwrap_or_default();
            return match errors.email.into_iter().next() {
                Some(msg) => Err(ValidationError::Field(msg).into()),
                None => Ok(()),
            };
        }

        let (status, detail) = error_detail(response).await;
        Err(AppError::Server {
            status: status.as_u16(),
            detail,
        })
    }
}

fn login_error_message(status: StatusCode, parsed: &LoginResponse) -> String {
    if let Some(first) = parsed.non_field_errors.first() {
        return first.clone();
    }
    if let Some(detail) = parsed.detail.as_ref().filter(|d| !d.trim().is_empty()) {
        return detail.clone();
    }
    let fields: Vec<String> = parsed
        .fields
        .iter()
        .map(|(key, value)| format!("{}: {}", key, field_text(value)))
        .collect();
    if !fields.is_empty() {
        return fields.join("; ");
    }
    format!("Server responded with status {}", status.as_u16())
}

fn field_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
