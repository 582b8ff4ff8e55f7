//! Per-browser authentication state fed by the identity provider.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast::error::RecvError};
use tokio::task::JoinHandle;

use crate::auth::{
    AuthEvent, AuthEventKind, AuthResult, IdentityProvider, ProviderSession, pkce,
};
use crate::domain::{session::Session, types::SessionKey};
use crate::forms::auth::CallbackQuery;
use crate::services::{ServiceError, ServiceResult};

#[derive(Debug, Default)]
struct Entry {
    session: Session,
    /// When the provider's access token lapses; the session is checked again
    /// after that.
    expires_at: Option<DateTime<Utc>>,
    /// A provider check is in flight for this key.
    resolving: bool,
}

impl Entry {
    fn needs_check(&self, now: DateTime<Utc>) -> bool {
        self.session.is_loading || self.expires_at.is_some_and(|at| at <= now)
    }

    fn sign_in(&mut self, session: ProviderSession) {
        self.session = Session::resolved(Some(session.identity));
        self.expires_at = session.expires_at;
        self.resolving = false;
    }
}

type Sessions = Arc<RwLock<HashMap<SessionKey, Entry>>>;

/// Where to send the browser to sign in, plus the PKCE verifier to keep
/// until the callback.
#[derive(Debug, Clone)]
pub struct SignInRedirect {
    pub url: String,
    pub verifier: String,
}

/// Process-wide owner of every [`Session`].
///
/// Keys are kept while signed in. A key the provider no longer knows is
/// forgotten and resolves to signed out on its next check; only a failed
/// provider sign-out leaves a signed-out entry behind.
pub struct SessionStore<P> {
    provider: Arc<P>,
    sessions: Sessions,
}

impl<P> Clone for SessionStore<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

/// Keeps the store subscribed to provider events; dropping it unsubscribes.
pub struct SessionListener {
    task: JoinHandle<()>,
}

impl SessionListener {
    /// Unsubscribes now instead of at the end of scope.
    pub fn stop(self) {}
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn apply(entries: &mut HashMap<SessionKey, Entry>, event: AuthEvent) {
    match (event.kind, event.session) {
        (AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed, Some(session)) => {
            entries.entry(event.key).or_default().sign_in(session);
        }
        _ => {
            entries.remove(&event.key);
        }
    }
}

/// Asks the provider about `key` and records the answer, whether or not the
/// request that started the check is still waiting for it.
async fn check_session<P>(provider: Arc<P>, sessions: Sessions, key: SessionKey) -> Session
where
    P: IdentityProvider,
{
    let checked = match provider.current_session(&key).await {
        Ok(checked) => checked,
        Err(err) => {
            log::warn!("Failed to check session, continuing signed out: {err}");
            None
        }
    };

    let mut sessions = sessions.write().await;
    match checked {
        Some(checked) => {
            let entry = sessions.entry(key).or_default();
            entry.sign_in(checked);
            entry.session.clone()
        }
        None => {
            sessions.remove(&key);
            Session::signed_out()
        }
    }
}

impl<P> SessionStore<P>
where
    P: IdentityProvider + 'static,
{
    /// Builds the store and registers its single provider listener.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(provider: P) -> (Self, SessionListener) {
        let mut events = provider.subscribe();
        let sessions: Sessions = Arc::default();

        let target = Arc::clone(&sessions);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        log::debug!("Session event {:?} for {}", event.kind, event.key);
                        apply(&mut *target.write().await, event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Session listener skipped {skipped} provider events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let store = Self {
            provider: Arc::new(provider),
            sessions,
        };
        (store, SessionListener { task })
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Snapshot of the session for `key`; unknown keys read as loading.
    pub async fn session(&self, key: &SessionKey) -> Session {
        self.sessions
            .read()
            .await
            .get(key)
            .map(|entry| entry.session.clone())
            .unwrap_or_default()
    }

    /// Resolves the session for `key`, asking the provider once if it has
    /// not been resolved yet or its access token has lapsed.
    ///
    /// Returns the stored value while another request is checking the key.
    /// A failed check resolves to signed out. The check runs on its own task
    /// so it completes even when the caller goes away.
    pub async fn current(&self, key: &SessionKey) -> Session {
        {
            let mut sessions = self.sessions.write().await;
            let entry = sessions.entry(key.clone()).or_default();
            if entry.resolving || !entry.needs_check(Utc::now()) {
                return entry.session.clone();
            }
            entry.resolving = true;
        }

        let check = tokio::spawn(check_session(
            Arc::clone(&self.provider),
            Arc::clone(&self.sessions),
            key.clone(),
        ));
        match check.await {
            Ok(session) => session,
            Err(err) => {
                log::error!("Session check for {key} did not finish: {err}");
                self.sessions.write().await.remove(key);
                Session::signed_out()
            }
        }
    }

    /// Starts the Google redirect handshake.
    pub async fn sign_in(&self, redirect_to: &str) -> AuthResult<SignInRedirect> {
        let verifier = pkce::generate_verifier();
        let url = self
            .provider
            .authorize_url(redirect_to, &pkce::challenge(&verifier))
            .await?;
        Ok(SignInRedirect { url, verifier })
    }

    /// Finishes the handshake; the resulting session arrives as a provider
    /// event.
    pub async fn complete_sign_in(&self, code: &str, verifier: &str) -> AuthResult<SessionKey> {
        self.provider.exchange_code(code, verifier).await
    }

    /// Signs out at the provider and clears the local identity whatever the
    /// provider answered.
    pub async fn sign_out(&self, key: &SessionKey) {
        let result = self.provider.sign_out(key).await;
        let mut sessions = self.sessions.write().await;
        match result {
            Ok(()) => {
                sessions.remove(key);
            }
            Err(err) => {
                log::warn!("Failed to sign out at the identity provider: {err}");
                // The provider may still accept the key, so pin it signed out.
                sessions.insert(
                    key.clone(),
                    Entry {
                        session: Session::signed_out(),
                        ..Default::default()
                    },
                );
            }
        }
    }
}

/// Handles the provider's redirect back to the callback route using the
/// verifier saved when the handshake started.
pub async fn complete_callback<P>(
    store: &SessionStore<P>,
    query: CallbackQuery,
    verifier: Option<String>,
) -> ServiceResult<SessionKey>
where
    P: IdentityProvider + 'static,
{
    if let Some(error) = query.error {
        return Err(ServiceError::Rejected(
            query.error_description.unwrap_or(error),
        ));
    }
    let code = query
        .code
        .ok_or_else(|| ServiceError::InvalidRequest("missing authorization code".to_string()))?;
    let verifier = verifier
        .ok_or_else(|| ServiceError::InvalidRequest("no sign-in in progress".to_string()))?;

    Ok(store.complete_sign_in(&code, &verifier).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::{Semaphore, broadcast};

    use super::*;
    use crate::auth::AuthError;
    use crate::domain::session::Identity;
    use crate::services::guard::{self, Guard, SIGN_IN_PATH};

    struct FakeProvider {
        events: broadcast::Sender<AuthEvent>,
        current: Mutex<AuthResult<Option<ProviderSession>>>,
        sign_out_fails: bool,
        /// Holds every check until a permit is added.
        gate: Option<Arc<Semaphore>>,
        checks: AtomicUsize,
    }

    impl FakeProvider {
        fn new(current: AuthResult<Option<ProviderSession>>) -> Self {
            let (events, _) = broadcast::channel(8);
            Self {
                events,
                current: Mutex::new(current),
                sign_out_fails: false,
                gate: None,
                checks: AtomicUsize::new(0),
            }
        }

        fn answer(&self, current: AuthResult<Option<ProviderSession>>) {
            *self.current.lock().unwrap() = current;
        }
    }

    impl IdentityProvider for FakeProvider {
        fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
            self.events.subscribe()
        }

        async fn authorize_url(&self, redirect_to: &str, challenge: &str) -> AuthResult<String> {
            Ok(format!("{redirect_to}?challenge={challenge}"))
        }

        async fn exchange_code(&self, _code: &str, _verifier: &str) -> AuthResult<SessionKey> {
            Ok(SessionKey::generate())
        }

        async fn current_session(&self, _key: &SessionKey) -> AuthResult<Option<ProviderSession>> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            match &*self.current.lock().unwrap() {
                Ok(session) => Ok(session.clone()),
                Err(err) => Err(AuthError::Provider(err.to_string())),
            }
        }

        async fn sign_out(&self, _key: &SessionKey) -> AuthResult<()> {
            if self.sign_out_fails {
                Err(AuthError::Provider("network down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn ana() -> Identity {
        Identity {
            subject: "user-1".to_string(),
            email: Some("ana@example.com".to_string()),
        }
    }

    fn signed(identity: Identity) -> ProviderSession {
        ProviderSession::new(identity, None)
    }

    fn checks(store: &SessionStore<FakeProvider>) -> usize {
        store.provider().checks.load(Ordering::SeqCst)
    }

    async fn settle<P: IdentityProvider + 'static>(
        store: &SessionStore<P>,
        key: &SessionKey,
        done: impl Fn(&Session) -> bool,
    ) -> Session {
        for _ in 0..100 {
            let session = store.session(key).await;
            if done(&session) {
                return session;
            }
            tokio::task::yield_now().await;
        }
        store.session(key).await
    }

    async fn is_tracked<P: IdentityProvider + 'static>(
        store: &SessionStore<P>,
        key: &SessionKey,
    ) -> bool {
        store.sessions.read().await.contains_key(key)
    }

    #[tokio::test]
    async fn unknown_key_is_loading_until_checked() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(Some(signed(ana())))));
        let key = SessionKey::generate();

        assert_eq!(store.session(&key).await, Session::loading());
        assert_eq!(store.current(&key).await, Session::resolved(Some(ana())));

        store.current(&key).await;
        assert_eq!(checks(&store), 1);
    }

    #[tokio::test]
    async fn failed_check_resolves_to_signed_out() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Err(
            AuthError::Provider("boom".to_string()),
        )));
        let key = SessionKey::generate();

        let session = store.current(&key).await;
        assert!(!session.is_loading);
        assert_eq!(session.identity, None);
    }

    #[tokio::test]
    async fn signed_out_keys_are_not_kept() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(None)));

        for _ in 0..3 {
            let key = SessionKey::generate();
            assert_eq!(store.current(&key).await, Session::signed_out());
            assert!(!is_tracked(&store, &key).await);
        }
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn provider_events_update_the_session() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(None)));
        let key = SessionKey::generate();
        let sender = store.provider().events.clone();

        sender
            .send(AuthEvent::signed_in(key.clone(), signed(ana())))
            .unwrap();
        let session = settle(&store, &key, |s| s.identity.is_some()).await;
        assert_eq!(session, Session::resolved(Some(ana())));

        sender.send(AuthEvent::signed_out(key.clone())).unwrap();
        let session = settle(&store, &key, |s| s.is_loading).await;
        assert_eq!(session, Session::loading());
        assert!(!is_tracked(&store, &key).await);
        assert_eq!(store.current(&key).await, Session::signed_out());
    }

    #[tokio::test]
    async fn expired_session_is_checked_again_and_revocation_redirects() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(None)));
        let key = SessionKey::generate();
        let lapsed = ProviderSession::new(ana(), Some(Utc::now() - chrono::Duration::minutes(1)));

        store
            .provider()
            .events
            .send(AuthEvent::signed_in(key.clone(), lapsed))
            .unwrap();
        let session = settle(&store, &key, |s| s.identity.is_some()).await;
        assert!(matches!(guard::check(&session), Guard::Allow(_)));

        let session = store.current(&key).await;
        assert_eq!(checks(&store), 1);
        assert_eq!(guard::check(&session), Guard::Redirect(SIGN_IN_PATH));
        assert!(!is_tracked(&store, &key).await);
    }

    #[tokio::test]
    async fn refreshed_session_is_not_checked_until_it_lapses() {
        let later = Utc::now() + chrono::Duration::hours(1);
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(Some(
            ProviderSession::new(ana(), Some(later)),
        ))));
        let key = SessionKey::generate();

        assert_eq!(store.current(&key).await, Session::resolved(Some(ana())));
        store.provider().answer(Ok(None));
        assert_eq!(store.current(&key).await, Session::resolved(Some(ana())));
        assert_eq!(checks(&store), 1);
    }

    #[tokio::test]
    async fn abandoned_check_still_resolves_the_session() {
        let gate = Arc::new(Semaphore::new(0));
        let mut provider = FakeProvider::new(Ok(Some(signed(ana()))));
        provider.gate = Some(Arc::clone(&gate));
        let (store, _listener) = SessionStore::start(provider);
        let key = SessionKey::generate();

        let request = tokio::spawn({
            let store = store.clone();
            let key = key.clone();
            async move { store.current(&key).await }
        });
        for _ in 0..100 {
            if checks(&store) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(checks(&store), 1);

        request.abort();
        assert!(request.await.unwrap_err().is_cancelled());
        assert_eq!(store.current(&key).await, Session::loading());

        gate.add_permits(1);
        let session = settle(&store, &key, |s| !s.is_loading).await;
        assert_eq!(session, Session::resolved(Some(ana())));
        assert_eq!(store.current(&key).await, Session::resolved(Some(ana())));
        assert_eq!(checks(&store), 1);
    }

    #[tokio::test]
    async fn sign_out_forgets_the_key() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(Some(signed(ana())))));
        let key = SessionKey::generate();

        assert!(store.current(&key).await.identity.is_some());
        store.sign_out(&key).await;
        assert!(!is_tracked(&store, &key).await);

        store.provider().answer(Ok(None));
        assert_eq!(store.current(&key).await, Session::signed_out());
    }

    #[tokio::test]
    async fn sign_out_clears_identity_even_when_provider_fails() {
        let mut provider = FakeProvider::new(Ok(Some(signed(ana()))));
        provider.sign_out_fails = true;
        let (store, _listener) = SessionStore::start(provider);
        let key = SessionKey::generate();

        assert!(store.current(&key).await.identity.is_some());
        store.sign_out(&key).await;
        assert_eq!(store.session(&key).await, Session::signed_out());
        assert_eq!(store.current(&key).await, Session::signed_out());
    }

    #[tokio::test]
    async fn stopped_listener_ignores_later_events() {
        let (store, listener) = SessionStore::start(FakeProvider::new(Ok(None)));
        let key = SessionKey::generate();
        let sender = store.provider().events.clone();

        listener.stop();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(
            sender
                .send(AuthEvent::signed_in(key.clone(), signed(ana())))
                .is_err()
        );
        assert_eq!(store.session(&key).await, Session::loading());
    }

    #[tokio::test]
    async fn callback_requires_code_and_verifier() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(None)));

        let rejected = complete_callback(
            &store,
            CallbackQuery {
                error: Some("access_denied".to_string()),
                ..Default::default()
            },
            Some("verifier".to_string()),
        )
        .await;
        assert!(matches!(rejected, Err(ServiceError::Rejected(reason)) if reason == "access_denied"));

        let no_verifier = complete_callback(
            &store,
            CallbackQuery {
                code: Some("code".to_string()),
                ..Default::default()
            },
            None,
        )
        .await;
        assert!(matches!(no_verifier, Err(ServiceError::InvalidRequest(_))));

        let key = complete_callback(
            &store,
            CallbackQuery {
                code: Some("code".to_string()),
                ..Default::default()
            },
            Some("verifier".to_string()),
        )
        .await;
        assert!(key.is_ok());
    }

    #[tokio::test]
    async fn sign_in_sends_the_verifier_challenge() {
        let (store, _listener) = SessionStore::start(FakeProvider::new(Ok(None)));
        let redirect = store.sign_in("/auth/callback").await.unwrap();
        assert_eq!(
            redirect.url,
            format!(
                "/auth/callback?challenge={}",
                pkce::challenge(&redirect.verifier)
            )
        );
    }
}
