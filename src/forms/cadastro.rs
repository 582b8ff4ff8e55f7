use serde::Deserialize;
use validator::{Validate, ValidateEmail, ValidateUrl};

use crate::forms::FormError;
use crate::services::cadastro::ContactFields;

/// Registration form posted from `/cadastro`.
///
/// Values are kept verbatim; only emptiness and the formats of the optional
/// email and LinkedIn fields are checked.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct CadastroForm {
    #[validate(length(min = 1))]
    pub nome_completo: String,
    #[serde(default)]
    pub celular: String,
    #[serde(default)]
    pub cep_residencia: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub linkedin: String,
}

impl CadastroForm {
    pub fn check(&self) -> Result<(), FormError> {
        self.validate()?;
        if !self.email.is_empty() && !self.email.validate_email() {
            return Err(FormError::InvalidEmail);
        }
        if !self.linkedin.is_empty() && !self.linkedin.validate_url() {
            return Err(FormError::InvalidUrl);
        }
        Ok(())
    }
}

impl From<CadastroForm> for ContactFields {
    fn from(form: CadastroForm) -> Self {
        Self {
            full_name: form.nome_completo,
            phone: form.celular,
            postal_code: form.cep_residencia,
            email: form.email,
            linkedin_url: form.linkedin,
        }
    }
}
