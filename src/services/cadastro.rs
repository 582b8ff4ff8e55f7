//! Registration form submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contact::NewContact;
use crate::forms::cadastro::CadastroForm;
use crate::repository::ContactWriter;

pub const SUCCESS_MESSAGE: &str = "Contato cadastrado com sucesso!";

/// Values currently entered in the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFields {
    pub full_name: String,
    pub phone: String,
    pub postal_code: String,
    pub email: String,
    pub linkedin_url: String,
}

impl ContactFields {
    pub fn to_new_contact(&self, registered_at: DateTime<Utc>) -> NewContact {
        NewContact {
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            postal_code: self.postal_code.clone(),
            email: self.email.clone(),
            linkedin_url: self.linkedin_url.clone(),
            registered_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum FormStatus {
    #[default]
    Idle,
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Default, Serialize)]
pub struct FormSubmissionModel {
    fields: ContactFields,
    status: FormStatus,
}

impl FormSubmissionModel {
    pub fn new(fields: ContactFields) -> Self {
        Self {
            fields,
            status: FormStatus::Idle,
        }
    }

    pub fn fields(&self) -> &ContactFields {
        &self.fields
    }

    pub fn status(&self) -> &FormStatus {
        &self.status
    }

    /// Marks the entered values as rejected without contacting the backend.
    pub fn reject(&mut self, reason: &str) {
        self.status = FormStatus::Failed(format!("Erro: {reason}"));
    }

    /// Inserts the entered values stamped with `now`.
    ///
    /// On success the fields are cleared; on failure they are kept so the
    /// user can retry.
    pub async fn submit<R>(&mut self, repo: &R, now: DateTime<Utc>) -> bool
    where
        R: ContactWriter,
    {
        match repo.create_contact(&self.fields.to_new_contact(now)).await {
            Ok(()) => {
                self.fields = ContactFields::default();
                self.status = FormStatus::Succeeded(SUCCESS_MESSAGE.to_string());
                true
            }
            Err(err) => {
                log::error!("Failed to create contact: {err}");
                self.reject(&err.to_string());
                false
            }
        }
    }
}

/// Validates the posted form and submits it when valid.
pub async fn submit_contact<R>(repo: &R, form: CadastroForm, now: DateTime<Utc>) -> FormSubmissionModel
where
    R: ContactWriter,
{
    let checked = form.check();
    let mut model = FormSubmissionModel::new(ContactFields::from(form));
    match checked {
        Ok(()) => {
            model.submit(repo, now).await;
        }
        Err(err) => {
            log::warn!("Rejected registration form: {err}");
            model.reject(err.user_message());
        }
    }
    model
}
