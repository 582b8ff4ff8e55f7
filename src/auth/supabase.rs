//! Supabase GoTrue client using the PKCE flow.
//!
//! Access and refresh tokens live in an in-memory vault keyed by
//! [`SessionKey`]; only the key is handed to the browser.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{RwLock, broadcast};

use crate::auth::{
    AuthError, AuthEvent, AuthResult, EVENT_CAPACITY, IdentityProvider, ProviderSession,
};
use crate::domain::{session::Identity, types::SessionKey};

/// OAuth provider requested from GoTrue.
pub const OAUTH_PROVIDER: &str = "google";

#[derive(Clone, Debug)]
struct TokenPair {
    access_token: String,
    refresh_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Self {
            subject: user.id,
            email: user.email.filter(|email| !email.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn split(self, now: DateTime<Utc>) -> (TokenPair, ProviderSession) {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.expires_in
                    .and_then(chrono::Duration::try_seconds)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            });
        (
            TokenPair {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at,
            },
            ProviderSession::new(self.user.into(), expires_at),
        )
    }
}

/// GoTrue reports errors under several field names depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct PkceExchange<'a> {
    auth_code: &'a str,
    code_verifier: &'a str,
}

async fn provider_error(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| status.to_string());
    AuthError::Provider(message)
}

#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    auth_url: Url,
    anon_key: String,
    vault: Arc<RwLock<HashMap<SessionKey, TokenPair>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuth {
    pub fn new(project_url: &str, anon_key: &str, timeout: Duration) -> AuthResult<Self> {
        let auth_url = Url::parse(&format!("{}/auth/v1/", project_url.trim_end_matches('/')))
            .map_err(|e| AuthError::InvalidConfig(format!("invalid Supabase url: {e}")))?;
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfig(
                "supabase.anon_key is required".to_string(),
            ));
        }
        let client = Client::builder().timeout(timeout).build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            client,
            auth_url,
            anon_key: anon_key.to_string(),
            vault: Arc::default(),
            events,
        })
    }

    fn endpoint(&self, path: &str) -> AuthResult<Url> {
        self.auth_url
            .join(path)
            .map_err(|e| AuthError::InvalidConfig(format!("invalid auth endpoint {path}: {e}")))
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers only means nobody is listening yet.
        let _ = self.events.send(event);
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> AuthResult<TokenResponse> {
        let response = self
            .client
            .post(self.endpoint("token")?)
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        Ok(response.json().await?)
    }

    /// `Ok(None)` when the access token is no longer accepted.
    async fn fetch_user(&self, access_token: &str) -> AuthResult<Option<Identity>> {
        let response = self
            .client
            .get(self.endpoint("user")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                Ok(Some(response.json::<UserResponse>().await?.into()))
            }
            _ => Err(provider_error(response).await),
        }
    }

    async fn refresh(&self, key: &SessionKey, refresh_token: &str) -> Option<ProviderSession> {
        match self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(tokens) => {
                let (pair, session) = tokens.split(Utc::now());
                self.vault.write().await.insert(key.clone(), pair);
                self.emit(AuthEvent::token_refreshed(key.clone(), session.clone()));
                Some(session)
            }
            Err(err) => {
                log::warn!("Failed to refresh session: {err}");
                self.vault.write().await.remove(key);
                self.emit(AuthEvent::signed_out(key.clone()));
                None
            }
        }
    }
}

impl IdentityProvider for SupabaseAuth {
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> AuthResult<String> {
        let mut url = self.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", OAUTH_PROVIDER)
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<SessionKey> {
        let body = serde_json::to_value(PkceExchange {
            auth_code: code,
            code_verifier,
        })
        .map_err(|e| AuthError::Provider(e.to_string()))?;
        let (pair, session) = self.token_request("pkce", body).await?.split(Utc::now());

        let key = SessionKey::generate();
        self.vault.write().await.insert(key.clone(), pair);
        self.emit(AuthEvent::signed_in(key.clone(), session));
        Ok(key)
    }

    async fn current_session(&self, key: &SessionKey) -> AuthResult<Option<ProviderSession>> {
        let Some(tokens) = self.vault.read().await.get(key).cloned() else {
            return Ok(None);
        };

        if tokens.is_expired(Utc::now()) {
            return Ok(self.refresh(key, &tokens.refresh_token).await);
        }
        match self.fetch_user(&tokens.access_token).await? {
            Some(identity) => Ok(Some(ProviderSession::new(identity, tokens.expires_at))),
            None => Ok(self.refresh(key, &tokens.refresh_token).await),
        }
    }

    async fn sign_out(&self, key: &SessionKey) -> AuthResult<()> {
        let tokens = self.vault.write().await.remove(key);
        self.emit(AuthEvent::signed_out(key.clone()));

        let Some(tokens) = tokens else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.endpoint("logout")?)
            .header("apikey", &self.anon_key)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }
        Ok(())
    }
}
