//! HTTP handlers and the helpers they share.

use actix_identity::Identity;
use actix_web::{HttpResponse, http::header, web};
use actix_web_flash_messages::{IncomingFlashMessages, Level};
use tera::{Context, Tera};

use crate::auth::AuthProvider;
use crate::domain::{session::Session, types::SessionKey};
use crate::services::session::SessionStore;

pub mod auth;
pub mod cadastro;
pub mod consulta;
pub mod main;

/// Session store as injected into handlers.
pub type AppSessionStore = SessionStore<AuthProvider>;

/// Registers every application route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(main::index)
        .service(main::logout)
        .service(auth::login)
        .service(auth::callback)
        .service(cadastro::show_cadastro)
        .service(cadastro::save_cadastro)
        .service(consulta::show_consulta);
}

/// Maps flash message levels to the CSS classes used by the templates.
pub fn alert_level_to_str(level: &Level) -> &'static str {
    match level {
        Level::Error => "danger",
        Level::Warning => "warning",
        Level::Success => "success",
        _ => "info",
    }
}

/// `303 See Other` to `location`, replacing the current history entry.
pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub fn render_template(tera: &Tera, template: &str, context: &Context) -> HttpResponse {
    match tera.render(template, context) {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Failed to render template '{template}': {err:?}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Context shared by every page: alerts, the signed-in user and the active
/// navigation entry.
pub fn base_context(
    flash_messages: &IncomingFlashMessages,
    session: &Session,
    current_page: &str,
) -> Context {
    let alerts = flash_messages
        .iter()
        .map(|f| (f.content(), alert_level_to_str(&f.level())))
        .collect::<Vec<_>>();

    let mut context = Context::new();
    context.insert("alerts", &alerts);
    context.insert("current_user", &session.identity());
    context.insert("current_page", current_page);
    context
}

/// Session key carried by the identity cookie, if any.
pub fn session_key(identity: Option<&Identity>) -> Option<SessionKey> {
    let id = identity?.id().ok()?;
    match SessionKey::parse(&id) {
        Ok(key) => Some(key),
        Err(err) => {
            log::warn!("Ignoring identity cookie: {err}");
            None
        }
    }
}

/// Resolved session of the requesting browser. Browsers without a key are
/// signed out.
pub async fn current_session(
    store: &AppSessionStore,
    identity: Option<&Identity>,
) -> (Option<SessionKey>, Session) {
    match session_key(identity) {
        Some(key) => {
            let session = store.current(&key).await;
            (Some(key), session)
        }
        None => (None, Session::signed_out()),
    }
}

/// Neutral placeholder shown while a session check is still in flight.
pub fn render_loading(tera: &Tera) -> HttpResponse {
    render_template(tera, "main/loading.html", &Context::new())
}
