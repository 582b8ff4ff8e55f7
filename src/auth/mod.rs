//! Identity provider boundary.
//!
//! Providers own the OAuth tokens; the application only ever holds a
//! [`SessionKey`] and learns about identity changes through [`AuthEvent`]s.

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{session::Identity, types::SessionKey};
use crate::models::config::{AuthProviderKind, ServerConfig};

pub mod local;
pub mod pkce;
pub mod supabase;

pub use local::LocalAuth;
pub use supabase::SupabaseAuth;

/// Capacity of the provider event channel.
pub(crate) const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider rejected the request: {0}")]
    Provider(String),

    #[error("invalid auth configuration: {0}")]
    InvalidConfig(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Identity signed in under a key, plus when the provider's access token
/// lapses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderSession {
    pub identity: Identity,
    /// `None` for sessions that never lapse.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderSession {
    pub fn new(identity: Identity, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            identity,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    TokenRefreshed,
    /// Explicit sign-out or a session that could no longer be refreshed.
    SignedOut,
}

/// Session change pushed by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthEvent {
    pub key: SessionKey,
    pub kind: AuthEventKind,
    pub session: Option<ProviderSession>,
}

impl AuthEvent {
    pub fn signed_in(key: SessionKey, session: ProviderSession) -> Self {
        Self {
            key,
            kind: AuthEventKind::SignedIn,
            session: Some(session),
        }
    }

    pub fn token_refreshed(key: SessionKey, session: ProviderSession) -> Self {
        Self {
            key,
            kind: AuthEventKind::TokenRefreshed,
            session: Some(session),
        }
    }

    pub fn signed_out(key: SessionKey) -> Self {
        Self {
            key,
            kind: AuthEventKind::SignedOut,
            session: None,
        }
    }
}

/// Redirect-based OAuth provider.
///
/// Methods return `Send` futures so session checks can run on spawned tasks.
pub trait IdentityProvider: Send + Sync {
    /// Registers a listener for session changes; dropping the receiver
    /// unsubscribes it.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// URL the browser is sent to in order to sign in with Google.
    fn authorize_url<'a>(
        &'a self,
        redirect_to: &'a str,
        code_challenge: &'a str,
    ) -> impl Future<Output = AuthResult<String>> + Send + 'a;

    /// Completes the handshake and returns the key of the new session.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        code_verifier: &'a str,
    ) -> impl Future<Output = AuthResult<SessionKey>> + Send + 'a;

    /// Session currently signed in under `key`, if any. Expired access tokens
    /// are refreshed first.
    fn current_session<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> impl Future<Output = AuthResult<Option<ProviderSession>>> + Send + 'a;

    fn sign_out<'a>(
        &'a self,
        key: &'a SessionKey,
    ) -> impl Future<Output = AuthResult<()>> + Send + 'a;
}

/// Provider selected by configuration.
#[derive(Clone)]
pub enum AuthProvider {
    Supabase(SupabaseAuth),
    Local(LocalAuth),
}

impl AuthProvider {
    pub fn from_config(config: &ServerConfig) -> AuthResult<Self> {
        match config.auth.provider {
            AuthProviderKind::Supabase => Ok(AuthProvider::Supabase(SupabaseAuth::new(
                &config.supabase.url,
                &config.supabase.anon_key,
                std::time::Duration::from_secs(config.request_timeout_secs),
            )?)),
            AuthProviderKind::Local => Ok(AuthProvider::Local(LocalAuth::new(
                &config.auth.local_email,
            ))),
        }
    }
}

impl IdentityProvider for AuthProvider {
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        match self {
            AuthProvider::Supabase(provider) => provider.subscribe(),
            AuthProvider::Local(provider) => provider.subscribe(),
        }
    }

    async fn authorize_url(&self, redirect_to: &str, code_challenge: &str) -> AuthResult<String> {
        match self {
            AuthProvider::Supabase(provider) => {
                provider.authorize_url(redirect_to, code_challenge).await
            }
            AuthProvider::Local(provider) => {
                provider.authorize_url(redirect_to, code_challenge).await
            }
        }
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<SessionKey> {
        match self {
            AuthProvider::Supabase(provider) => provider.exchange_code(code, code_verifier).await,
            AuthProvider::Local(provider) => provider.exchange_code(code, code_verifier).await,
        }
    }

    async fn current_session(&self, key: &SessionKey) -> AuthResult<Option<ProviderSession>> {
        match self {
            AuthProvider::Supabase(provider) => provider.current_session(key).await,
            AuthProvider::Local(provider) => provider.current_session(key).await,
        }
    }

    async fn sign_out(&self, key: &SessionKey) -> AuthResult<()> {
        match self {
            AuthProvider::Supabase(provider) => provider.sign_out(key).await,
            AuthProvider::Local(provider) => provider.sign_out(key).await,
        }
    }
}
