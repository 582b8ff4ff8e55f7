use actix_identity::Identity;
use actix_session::Session as CookieSession;
use actix_web::{Responder, get, web};
use actix_web_flash_messages::IncomingFlashMessages;
use tera::Tera;

use crate::forms::consulta::ConsultaQuery;
use crate::models::config::ServerConfig;
use crate::repository::Backend;
use crate::routes::{
    AppSessionStore, base_context, current_session, redirect, render_loading, render_template,
};
use crate::services::consulta::{ConsultaState, load_consulta_page};
use crate::services::guard::{self, Guard};

/// Cookie-session key holding the listing state between requests.
const CONSULTA_STATE_KEY: &str = "consulta";

#[get("/consulta")]
pub async fn show_consulta(
    identity: Option<Identity>,
    query: web::Query<ConsultaQuery>,
    store: web::Data<AppSessionStore>,
    repo: web::Data<Backend>,
    cookie_session: CookieSession,
    flash_messages: IncomingFlashMessages,
    server_config: web::Data<ServerConfig>,
    tera: web::Data<Tera>,
) -> impl Responder {
    let (_, session) = current_session(&store, identity.as_ref()).await;
    match guard::check(&session) {
        Guard::Loading => return render_loading(&tera),
        Guard::Redirect(location) => return redirect(location),
        Guard::Allow(_) => {}
    }

    let state = cookie_session
        .get::<ConsultaState>(CONSULTA_STATE_KEY)
        .unwrap_or_else(|err| {
            log::warn!("Discarding unreadable listing state: {err}");
            None
        });

    let (data, state) = load_consulta_page(
        repo.get_ref(),
        server_config.consulta.page_size,
        server_config.consulta.count_mode,
        state,
        query.into_inner(),
    )
    .await;

    if let Err(err) = cookie_session.insert(CONSULTA_STATE_KEY, &state) {
        log::error!("Failed to store listing state: {err}");
    }

    let mut context = base_context(&flash_messages, &session, "consulta");
    context.insert("contacts", &data.contacts);
    context.insert("filters", &data.filters);
    context.insert("error", &data.error);
    render_template(&tera, "consulta/index.html", &context)
}
