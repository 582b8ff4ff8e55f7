use actix_identity::Identity;
use actix_session::Session as CookieSession;
use actix_web::{HttpMessage, HttpRequest, Responder, get, web};
use actix_web_flash_messages::FlashMessage;

use crate::forms::auth::CallbackQuery;
use crate::models::config::ServerConfig;
use crate::routes::{AppSessionStore, redirect};
use crate::services::session::complete_callback;

/// Cookie-session key holding the PKCE verifier between login and callback.
const PKCE_VERIFIER_KEY: &str = "pkce_verifier";

#[get("/auth/login")]
pub async fn login(
    store: web::Data<AppSessionStore>,
    cookie_session: CookieSession,
    server_config: web::Data<ServerConfig>,
) -> impl Responder {
    let sign_in = match store.sign_in(&server_config.auth.redirect_url).await {
        Ok(sign_in) => sign_in,
        Err(err) => {
            log::error!("Failed to start sign-in: {err}");
            FlashMessage::error("Não foi possível iniciar o login.").send();
            return redirect("/");
        }
    };

    if let Err(err) = cookie_session.insert(PKCE_VERIFIER_KEY, &sign_in.verifier) {
        log::error!("Failed to store the PKCE verifier: {err}");
        FlashMessage::error("Não foi possível iniciar o login.").send();
        return redirect("/");
    }

    redirect(&sign_in.url)
}

#[get("/auth/callback")]
pub async fn callback(
    request: HttpRequest,
    query: web::Query<CallbackQuery>,
    store: web::Data<AppSessionStore>,
    cookie_session: CookieSession,
) -> impl Responder {
    let verifier = cookie_session
        .remove_as::<String>(PKCE_VERIFIER_KEY)
        .and_then(Result::ok);

    let key = match complete_callback(&store, query.into_inner(), verifier).await {
        Ok(key) => key,
        Err(err) => {
            log::warn!("Failed to complete sign-in: {err}");
            FlashMessage::error("Falha ao entrar com Google.").send();
            return redirect("/");
        }
    };

    if let Err(err) = Identity::login(&request.extensions(), key.to_string()) {
        log::error!("Failed to attach the session to the browser: {err}");
        FlashMessage::error("Falha ao entrar com Google.").send();
    }
    redirect("/")
}
