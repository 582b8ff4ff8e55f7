use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    db::establish_connection_pool,
    domain::contact::{Contact, NewContact},
    models::config::{BackendKind, ServerConfig},
    repository::errors::RepositoryResult,
};

pub mod contact;
pub mod errors;
pub mod memory;
pub mod postgrest;

pub use contact::DieselRepository;
pub use memory::MemoryRepository;
pub use postgrest::PostgrestRepository;

/// Searchable contact columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    FullName,
    Email,
    Phone,
}

impl ContactField {
    /// Column name in the hosted `Contatos` table.
    pub const fn column(self) -> &'static str {
        match self {
            ContactField::FullName => "nome_completo",
            ContactField::Email => "email",
            ContactField::Phone => "celular",
        }
    }
}

/// Free-text filters; each one is a case-insensitive substring match and an
/// empty value leaves its column unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactFilters {
    pub full_name: String,
    pub email: String,
    pub phone: String,
}

impl ContactFilters {
    pub fn new(
        full_name: impl AsRef<str>,
        email: impl AsRef<str>,
        phone: impl AsRef<str>,
    ) -> Self {
        Self {
            full_name: full_name.as_ref().trim().to_string(),
            email: email.as_ref().trim().to_string(),
            phone: phone.as_ref().trim().to_string(),
        }
    }

    /// Filters that actually constrain the result, in column order.
    pub fn active(&self) -> impl Iterator<Item = (ContactField, &str)> {
        [
            (ContactField::FullName, self.full_name.as_str()),
            (ContactField::Email, self.email.as_str()),
            (ContactField::Phone, self.phone.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    /// Zero-based row offset of the first row on the page. Pages past
    /// `usize::MAX` rows saturate and simply read as empty.
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.per_page)
    }

    /// Zero-based inclusive `[from, to]` window of the page.
    pub fn range(&self) -> (usize, usize) {
        let from = self.offset();
        (from, from.saturating_add(self.per_page.max(1) - 1))
    }
}

/// Query descriptor for one contact listing: rows are always ordered by full
/// name ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactListQuery {
    pub filters: ContactFilters,
    pub pagination: Option<Pagination>,
}

impl ContactListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filters(mut self, filters: ContactFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn paginate(mut self, page: usize, per_page: usize) -> Self {
        self.pagination = Some(Pagination { page, per_page });
        self
    }
}

/// Read side of a contact backend.
///
/// Methods return `Send` futures so callers may move them onto spawned tasks.
pub trait ContactReader: Send + Sync {
    /// Rows matching the filters, ordered by full name, within the page window.
    fn list_contacts<'a>(
        &'a self,
        query: &'a ContactListQuery,
    ) -> impl Future<Output = RepositoryResult<Vec<Contact>>> + Send + 'a;

    /// Number of rows matching the filters; pagination is ignored.
    fn count_contacts<'a>(
        &'a self,
        query: &'a ContactListQuery,
    ) -> impl Future<Output = RepositoryResult<usize>> + Send + 'a;
}

pub trait ContactWriter: Send + Sync {
    fn create_contact<'a>(
        &'a self,
        contact: &'a NewContact,
    ) -> impl Future<Output = RepositoryResult<()>> + Send + 'a;
}

/// Backend selected by configuration.
#[derive(Clone)]
pub enum Backend {
    Postgrest(PostgrestRepository),
    Sqlite(DieselRepository),
    Memory(MemoryRepository),
}

impl Backend {
    pub fn from_config(config: &ServerConfig) -> RepositoryResult<Self> {
        match config.backend {
            BackendKind::Postgrest => Ok(Backend::Postgrest(PostgrestRepository::new(
                &config.supabase.url,
                &config.supabase.anon_key,
                std::time::Duration::from_secs(config.request_timeout_secs),
            )?)),
            BackendKind::Sqlite => {
                let pool = establish_connection_pool(&config.database_url)?;
                Ok(Backend::Sqlite(DieselRepository::new(pool)))
            }
            BackendKind::Memory => Ok(Backend::Memory(MemoryRepository::new())),
        }
    }
}

impl ContactReader for Backend {
    async fn list_contacts(&self, query: &ContactListQuery) -> RepositoryResult<Vec<Contact>> {
        match self {
            Backend::Postgrest(repo) => repo.list_contacts(query).await,
            Backend::Sqlite(repo) => repo.list_contacts(query).await,
            Backend::Memory(repo) => repo.list_contacts(query).await,
        }
    }

    async fn count_contacts(&self, query: &ContactListQuery) -> RepositoryResult<usize> {
        match self {
            Backend::Postgrest(repo) => repo.count_contacts(query).await,
            Backend::Sqlite(repo) => repo.count_contacts(query).await,
            Backend::Memory(repo) => repo.count_contacts(query).await,
        }
    }
}

impl ContactWriter for Backend {
    async fn create_contact(&self, contact: &NewContact) -> RepositoryResult<()> {
        match self {
            Backend::Postgrest(repo) => repo.create_contact(contact).await,
            Backend::Sqlite(repo) => repo.create_contact(contact).await,
            Backend::Memory(repo) => repo.create_contact(contact).await,
        }
    }
}
