use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::domain::contact::{Contact as DomainContact, NewContact as DomainNewContact};
use crate::domain::types::{ContactId, TypeConstraintError};

#[derive(Debug, Clone, Identifiable, Queryable)]
#[diesel(table_name = crate::schema::contatos)]
/// Diesel model for [`crate::domain::contact::Contact`].
pub struct Contact {
    pub id: i32,
    pub nome_completo: Option<String>,
    pub celular: Option<String>,
    pub cep_residencia: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,
    pub cadastro_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::contatos)]
/// Insertable form of [`Contact`]; `id` and `created_at` come from the database.
pub struct NewContact<'a> {
    pub nome_completo: &'a str,
    pub celular: &'a str,
    pub cep_residencia: &'a str,
    pub email: &'a str,
    pub linkedin: &'a str,
    pub cadastro_at: NaiveDateTime,
}

impl TryFrom<Contact> for DomainContact {
    type Error = TypeConstraintError;

    fn try_from(contact: Contact) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ContactId::new(contact.id)?,
            full_name: contact.nome_completo,
            phone: contact.celular,
            postal_code: contact.cep_residencia,
            email: contact.email,
            linkedin_url: contact.linkedin,
            registered_at: contact.cadastro_at.map(|at| at.and_utc()),
            created_at: contact.created_at.and_utc(),
        })
    }
}

impl<'a> From<&'a DomainNewContact> for NewContact<'a> {
    fn from(contact: &'a DomainNewContact) -> Self {
        Self {
            nome_completo: contact.full_name.as_str(),
            celular: contact.phone.as_str(),
            cep_residencia: contact.postal_code.as_str(),
            email: contact.email.as_str(),
            linkedin: contact.linkedin_url.as_str(),
            cadastro_at: contact.registered_at.naive_utc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn from_domain_new_keeps_values_verbatim() {
        let domain = DomainNewContact {
            full_name: "  Ana Silva ".to_string(),
            phone: String::new(),
            postal_code: "01000-000".to_string(),
            email: String::new(),
            linkedin_url: String::new(),
            registered_at: Utc::now(),
        };
        let new: NewContact = (&domain).into();
        assert_eq!(new.nome_completo, "  Ana Silva ");
        assert_eq!(new.celular, "");
        assert_eq!(new.cep_residencia, "01000-000");
        assert_eq!(new.cadastro_at, domain.registered_at.naive_utc());
    }

    #[test]
    fn contact_into_domain() {
        let now: NaiveDateTime = Utc::now().naive_utc();
        let db_contact = Contact {
            id: 4,
            nome_completo: Some("Carlos".to_string()),
            celular: None,
            cep_residencia: None,
            email: Some("carlos@example.com".to_string()),
            linkedin: None,
            cadastro_at: Some(now),
            created_at: now,
        };
        let domain = DomainContact::try_from(db_contact).unwrap();
        assert_eq!(domain.id.get(), 4);
        assert_eq!(domain.full_name.as_deref(), Some("Carlos"));
        assert_eq!(domain.registered_at, Some(now.and_utc()));
        assert_eq!(domain.created_at, now.and_utc());
    }

    #[test]
    fn contact_with_invalid_id_is_rejected() {
        let now = Utc::now().naive_utc();
        let db_contact = Contact {
            id: 0,
            nome_completo: None,
            celular: None,
            cep_residencia: None,
            email: None,
            linkedin: None,
            cadastro_at: None,
            created_at: now,
        };
        assert_eq!(
            DomainContact::try_from(db_contact),
            Err(TypeConstraintError::NonPositiveId)
        );
    }
}
