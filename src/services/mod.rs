//! Application state machines driven by the HTTP handlers.

use thiserror::Error;

use crate::auth::AuthError;

pub mod cadastro;
pub mod consulta;
pub mod guard;
pub mod session;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is missing data the flow needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider redirected back with an error instead of a code.
    #[error("sign-in rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
