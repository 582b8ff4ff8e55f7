use actix_identity::Identity;
use actix_web::{Responder, get, post, web};
use actix_web_flash_messages::{FlashMessage, IncomingFlashMessages};
use chrono::Utc;
use tera::Tera;

use crate::forms::cadastro::CadastroForm;
use crate::repository::Backend;
use crate::routes::{AppSessionStore, base_context, current_session, redirect, render_template};
use crate::services::cadastro::{FormStatus, FormSubmissionModel, submit_contact};

#[get("/cadastro")]
pub async fn show_cadastro(
    identity: Option<Identity>,
    store: web::Data<AppSessionStore>,
    flash_messages: IncomingFlashMessages,
    tera: web::Data<Tera>,
) -> impl Responder {
    let (_, session) = current_session(&store, identity.as_ref()).await;
    let mut context = base_context(&flash_messages, &session, "cadastro");
    context.insert("form", &FormSubmissionModel::default());
    render_template(&tera, "cadastro/index.html", &context)
}

#[post("/cadastro")]
pub async fn save_cadastro(
    identity: Option<Identity>,
    store: web::Data<AppSessionStore>,
    repo: web::Data<Backend>,
    flash_messages: IncomingFlashMessages,
    tera: web::Data<Tera>,
    web::Form(form): web::Form<CadastroForm>,
) -> impl Responder {
    let model = submit_contact(repo.get_ref(), form, Utc::now()).await;

    if let FormStatus::Succeeded(message) = model.status() {
        FlashMessage::success(message.as_str()).send();
        return redirect("/cadastro");
    }

    let (_, session) = current_session(&store, identity.as_ref()).await;
    let mut context = base_context(&flash_messages, &session, "cadastro");
    context.insert("form", &model);
    render_template(&tera, "cadastro/index.html", &context)
}
