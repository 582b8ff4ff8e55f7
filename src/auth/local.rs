//! Development provider that signs every browser in as one configured email,
//! still going through the redirect and PKCE steps.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Url;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::auth::{
    AuthError, AuthEvent, AuthResult, EVENT_CAPACITY, IdentityProvider, ProviderSession, pkce,
};
use crate::domain::{session::Identity, types::SessionKey};

/// How long an authorization code may wait for its callback.
const CODE_LIFETIME_MINUTES: i64 = 10;

#[derive(Clone, Debug)]
struct PendingCode {
    challenge: String,
    issued_at: DateTime<Utc>,
}

impl PendingCode {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at > Duration::minutes(CODE_LIFETIME_MINUTES)
    }
}

#[derive(Clone)]
pub struct LocalAuth {
    identity: Identity,
    codes: Arc<RwLock<HashMap<String, PendingCode>>>,
    sessions: Arc<RwLock<HashMap<SessionKey, Identity>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl LocalAuth {
    pub fn new(email: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            identity: Identity {
                subject: format!("local:{email}"),
                email: Some(email.to_string()),
            },
            codes: Arc::default(),
            sessions: Arc::default(),
            events,
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers only means nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Issues a code for `code_challenge`, dropping codes whose callback
    /// never came.
    async fn issue_code(
        &self,
        redirect_to: &str,
        code_challenge: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        let code = Uuid::new_v4().simple().to_string();
        let url = callback_with_code(redirect_to, &code)?;

        let mut codes = self.codes.write().await;
        codes.retain(|_, pending| !pending.is_expired(now));
        codes.insert(
            code,
            PendingCode {
                challenge: code_challenge.to_string(),
                issued_at: now,
            },
        );
        Ok(url)
    }
}

/// Appends `code` to the callback URL, which may be relative.
fn callback_with_code(redirect_to: &str, code: &str) -> AuthResult<String> {
    if let Ok(mut url) = Url::parse(redirect_to) {
        url.query_pairs_mut().append_pair("code", code);
        return Ok(url.to_string());
    }
    if redirect_to.starts_with('/') {
        let separator = if redirect_to.contains('?') { '&' } else { '?' };
        return Ok(format!("{redirect_to}{separator}code={code}"));
    }
    Err(AuthError::InvalidConfig(format!(
        "invalid redirect url: {redirect_to}"
    )))
}

impl IdentityProvider for LocalAuth {
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> AuthResult<String> {
        self.issue_code(redirect_to, code_challenge, Utc::now()).await
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<SessionKey> {
        let pending = self
            .codes
            .write()
            .await
            .remove(code)
            .filter(|pending| !pending.is_expired(Utc::now()))
            .ok_or_else(|| AuthError::Provider("invalid authorization code".to_string()))?;

        if pkce::challenge(code_verifier) != pending.challenge {
            return Err(AuthError::Provider("code verifier mismatch".to_string()));
        }

        let key = SessionKey::generate();
        self.sessions
            .write()
            .await
            .insert(key.clone(), self.identity.clone());
        self.emit(AuthEvent::signed_in(
            key.clone(),
            ProviderSession::new(self.identity.clone(), None),
        ));
        Ok(key)
    }

    async fn current_session(&self, key: &SessionKey) -> AuthResult<Option<ProviderSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .get(key)
            .map(|identity| ProviderSession::new(identity.clone(), None)))
    }

    async fn sign_out(&self, key: &SessionKey) -> AuthResult<()> {
        self.sessions.write().await.remove(key);
        self.emit(AuthEvent::signed_out(key.clone()));
        Ok(())
    }
}
