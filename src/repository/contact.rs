use diesel::prelude::*;
use diesel::sqlite::Sqlite;

use crate::{
    db::{DbPool, get_connection},
    domain::contact::{Contact, NewContact},
    repository::{
        ContactFilters, ContactListQuery, ContactReader, ContactWriter,
        errors::{RepositoryError, RepositoryResult},
    },
    schema::contatos,
};

/// Diesel/SQLite implementation of the contact repositories.
///
/// Diesel is synchronous, so every call runs on the blocking thread pool.
#[derive(Clone)]
pub struct DieselRepository {
    pool: DbPool,
}

impl DieselRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn run<T, F>(&self, work: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> RepositoryResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            work(&mut conn)
        })
        .await?
    }
}

fn like_pattern(value: &str) -> String {
    format!("%{value}%")
}

/// `SELECT` over `contatos` restricted by every non-empty filter. SQLite's
/// `LIKE` is case-insensitive for ASCII.
fn filtered(filters: &ContactFilters) -> contatos::BoxedQuery<'static, Sqlite> {
    let mut query = contatos::table.into_boxed();
    if !filters.full_name.is_empty() {
        query = query.filter(contatos::nome_completo.like(like_pattern(&filters.full_name)));
    }
    if !filters.email.is_empty() {
        query = query.filter(contatos::email.like(like_pattern(&filters.email)));
    }
    if !filters.phone.is_empty() {
        query = query.filter(contatos::celular.like(like_pattern(&filters.phone)));
    }
    query
}

impl ContactReader for DieselRepository {
    async fn list_contacts(&self, query: &ContactListQuery) -> RepositoryResult<Vec<Contact>> {
        use crate::models::contact::Contact as DbContact;

        let query = query.clone();
        self.run(move |conn| {
            let mut select = filtered(&query.filters).order(contatos::nome_completo.asc());
            if let Some(pagination) = &query.pagination {
                select = select
                    .limit(i64::try_from(pagination.per_page).unwrap_or(i64::MAX))
                    .offset(i64::try_from(pagination.offset()).unwrap_or(i64::MAX));
            }

            select
                .load::<DbContact>(conn)?
                .into_iter()
                .map(|row| Contact::try_from(row).map_err(RepositoryError::from))
                .collect()
        })
        .await
    }

    async fn count_contacts(&self, query: &ContactListQuery) -> RepositoryResult<usize> {
        let filters = query.filters.clone();
        self.run(move |conn| {
            let total: i64 = filtered(&filters).count().get_result(conn)?;
            Ok(total as usize)
        })
        .await
    }
}

impl ContactWriter for DieselRepository {
    async fn create_contact(&self, contact: &NewContact) -> RepositoryResult<()> {
        use crate::models::contact::NewContact as DbNewContact;

        let contact = contact.clone();
        self.run(move |conn| {
            let insertable: DbNewContact = (&contact).into();
            diesel::insert_into(contatos::table)
                .values(&insertable)
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
