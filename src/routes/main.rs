use actix_identity::Identity;
use actix_web::{Responder, get, web};
use actix_web_flash_messages::IncomingFlashMessages;
use tera::Tera;

use crate::routes::{
    AppSessionStore, base_context, current_session, redirect, render_loading, render_template,
    session_key,
};

#[get("/")]
pub async fn index(
    identity: Option<Identity>,
    store: web::Data<AppSessionStore>,
    flash_messages: IncomingFlashMessages,
    tera: web::Data<Tera>,
) -> impl Responder {
    let (_, session) = current_session(&store, identity.as_ref()).await;
    if session.is_loading {
        return render_loading(&tera);
    }

    let context = base_context(&flash_messages, &session, "index");
    render_template(&tera, "main/index.html", &context)
}

#[get("/logout")]
pub async fn logout(
    identity: Option<Identity>,
    store: web::Data<AppSessionStore>,
) -> impl Responder {
    if let Some(key) = session_key(identity.as_ref()) {
        store.sign_out(&key).await;
    }
    if let Some(identity) = identity {
        identity.logout();
    }
    redirect("/")
}
