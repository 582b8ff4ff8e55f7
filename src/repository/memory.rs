use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    domain::{
        contact::{Contact, NewContact},
        types::ContactId,
    },
    repository::{
        ContactField, ContactListQuery, ContactReader, ContactWriter,
        errors::{RepositoryError, RepositoryResult},
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    contacts: Vec<Contact>,
    next_id: i32,
    failure: Option<String>,
}

impl MemoryState {
    fn check(&self) -> RepositoryResult<()> {
        match &self.failure {
            Some(message) => Err(RepositoryError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn matching<'a>(&'a self, query: &'a ContactListQuery) -> impl Iterator<Item = &'a Contact> {
        self.contacts.iter().filter(move |contact| {
            query.filters.active().all(|(field, needle)| {
                let value = match field {
                    ContactField::FullName => contact.full_name.as_deref(),
                    ContactField::Email => contact.email.as_deref(),
                    ContactField::Phone => contact.phone.as_deref(),
                };
                value
                    .map(|value| value.to_lowercase().contains(&needle.to_lowercase()))
                    .unwrap_or(false)
            })
        })
    }
}

/// Process-local contact table used for development and tests.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `message` until [`recover`](Self::recover).
    pub async fn fail_with(&self, message: impl Into<String>) {
        self.state.write().await.failure = Some(message.into());
    }

    pub async fn recover(&self) {
        self.state.write().await.failure = None;
    }

    /// Snapshot of the stored rows in insertion order.
    pub async fn contacts(&self) -> Vec<Contact> {
        self.state.read().await.contacts.clone()
    }
}

impl ContactReader for MemoryRepository {
    async fn list_contacts(&self, query: &ContactListQuery) -> RepositoryResult<Vec<Contact>> {
        let state = self.state.read().await;
        state.check()?;

        let mut rows: Vec<Contact> = state.matching(query).cloned().collect();
        rows.sort_by(|a, b| {
            (a.full_name.is_none(), &a.full_name).cmp(&(b.full_name.is_none(), &b.full_name))
        });

        Ok(match &query.pagination {
            Some(pagination) => rows
                .into_iter()
                .skip(pagination.offset())
                .take(pagination.per_page)
                .collect(),
            None => rows,
        })
    }

    async fn count_contacts(&self, query: &ContactListQuery) -> RepositoryResult<usize> {
        let state = self.state.read().await;
        state.check()?;
        Ok(state.matching(query).count())
    }
}

impl ContactWriter for MemoryRepository {
    async fn create_contact(&self, contact: &NewContact) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        state.check()?;

        state.next_id += 1;
        let id = ContactId::new(state.next_id)?;
        state.contacts.push(Contact {
            id,
            full_name: Some(contact.full_name.clone()),
            phone: Some(contact.phone.clone()),
            postal_code: Some(contact.postal_code.clone()),
            email: Some(contact.email.clone()),
            linkedin_url: Some(contact.linkedin_url.clone()),
            registered_at: Some(contact.registered_at),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ContactFilters;

    fn new_contact(name: &str, email: &str) -> NewContact {
        NewContact {
            full_name: name.to_string(),
            phone: String::new(),
            postal_code: String::new(),
            email: email.to_string(),
            linkedin_url: String::new(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn lists_sorted_and_filtered_case_insensitively() {
        let repo = MemoryRepository::new();
        for (name, email) in [
            ("Carlos", "carlos@example.com"),
            ("ANA PAULA", "ap@example.com"),
            ("Ana Silva", "ana@example.com"),
        ] {
            repo.create_contact(&new_contact(name, email)).await.unwrap();
        }

        let query = ContactListQuery::new().filters(ContactFilters::new("ana", "", ""));
        let names: Vec<_> = repo
            .list_contacts(&query)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|c| c.full_name)
            .collect();
        assert_eq!(names, vec!["ANA PAULA", "Ana Silva"]);
        assert_eq!(repo.count_contacts(&query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pages_are_windowed_after_sorting() {
        let repo = MemoryRepository::new();
        for name in ["e", "d", "c", "b", "a"] {
            repo.create_contact(&new_contact(name, "")).await.unwrap();
        }
        let query = ContactListQuery::new().paginate(2, 2);
        let names: Vec<_> = repo
            .list_contacts(&query)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|c| c.full_name)
            .collect();
        assert_eq!(names, vec!["c", "d"]);
        assert_eq!(repo.count_contacts(&query).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn injected_failure_is_reported_until_recovered() {
        let repo = MemoryRepository::new();
        repo.fail_with("permission denied").await;
        let err = repo
            .create_contact(&new_contact("Ana", ""))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert!(repo.contacts().await.is_empty());

        repo.recover().await;
        repo.create_contact(&new_contact("Ana", "")).await.unwrap();
        assert_eq!(repo.contacts().await.len(), 1);
    }
}
