use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::types::ContactId;

/// A registered contact as stored by the table backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub email: Option<String>,
    pub linkedin_url: Option<String>,
    /// Instant the registration form was submitted.
    pub registered_at: Option<DateTime<Utc>>,
    /// Assigned by the backend on insert.
    pub created_at: DateTime<Utc>,
}

/// Values sent with a single insert.
///
/// Field values are kept verbatim: no trimming, empty strings included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewContact {
    pub full_name: String,
    pub phone: String,
    pub postal_code: String,
    pub email: String,
    pub linkedin_url: String,
    pub registered_at: DateTime<Utc>,
}
