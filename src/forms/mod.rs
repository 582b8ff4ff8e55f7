//! Form definitions backing the public routes.

use thiserror::Error;
use validator::ValidationErrors;

pub mod auth;
pub mod cadastro;
pub mod consulta;

#[derive(Debug, Error)]
/// Errors that can occur when processing form data.
pub enum FormError {
    #[error("validation errors: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("invalid email address")]
    InvalidEmail,

    #[error("invalid url")]
    InvalidUrl,
}

impl FormError {
    /// Message shown next to the form.
    pub fn user_message(&self) -> &'static str {
        match self {
            FormError::Validation(_) => "Preencha o nome completo.",
            FormError::InvalidEmail => "Email inválido.",
            FormError::InvalidUrl => "Endereço do LinkedIn inválido.",
        }
    }
}
