use serde::Serialize;

use crate::domain::contact::Contact;
use crate::pagination::Paginated;
use crate::repository::ContactFilters;

/// Data required to render the consulta template.
#[derive(Debug, Serialize)]
pub struct ConsultaPageData {
    /// Current page of contacts with its navigation state.
    pub contacts: Paginated<Contact>,
    /// Filters echoed back into the search inputs.
    pub filters: ContactFilters,
    /// Backend message of the last failed fetch.
    pub error: Option<String>,
}
