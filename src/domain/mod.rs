//! Domain entities shared by the repositories, services and routes.

pub mod contact;
pub mod session;
pub mod types;
