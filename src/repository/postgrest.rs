//! Contacts stored in a hosted table served by PostgREST (Supabase).

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    domain::{
        contact::{Contact, NewContact},
        types::ContactId,
    },
    repository::{
        ContactListQuery, ContactReader, ContactWriter,
        errors::{RepositoryError, RepositoryResult},
    },
};

/// Hosted table holding the registrations.
pub const CONTACTS_TABLE: &str = "Contatos";

#[derive(Clone)]
pub struct PostgrestRepository {
    client: Client,
    table_url: Url,
}

/// Row as returned by `select=*`.
#[derive(Debug, Deserialize)]
struct ContactRow {
    id: i32,
    nome_completo: Option<String>,
    celular: Option<String>,
    cep_residencia: Option<String>,
    email: Option<String>,
    linkedin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    cadastro_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    nome_completo: &'a str,
    celular: &'a str,
    cep_residencia: &'a str,
    email: &'a str,
    linkedin: &'a str,
    cadastro_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    message: String,
}

/// Accepts both `timestamptz` (RFC 3339) and bare `timestamp` values.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|at| at.and_utc())
                .ok()
        })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        None => Ok(None),
    }
}

impl TryFrom<ContactRow> for Contact {
    type Error = RepositoryError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ContactId::new(row.id)?,
            full_name: row.nome_completo,
            phone: row.celular,
            postal_code: row.cep_residencia,
            email: row.email,
            linkedin_url: row.linkedin,
            registered_at: row.cadastro_at,
            created_at: row.created_at,
        })
    }
}

impl<'a> From<&'a NewContact> for InsertRow<'a> {
    fn from(contact: &'a NewContact) -> Self {
        Self {
            nome_completo: &contact.full_name,
            celular: &contact.phone,
            cep_residencia: &contact.postal_code,
            email: &contact.email,
            linkedin: &contact.linkedin_url,
            cadastro_at: contact.registered_at,
        }
    }
}

/// Query-string parameters shared by the select and count requests.
fn filter_params(query: &ContactListQuery) -> Vec<(String, String)> {
    query
        .filters
        .active()
        .map(|(field, value)| (field.column().to_string(), format!("ilike.*{value}*")))
        .collect()
}

fn select_params(query: &ContactListQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), "nome_completo.asc".to_string()),
    ];
    params.extend(filter_params(query));
    params
}

/// `Range` header value selecting the page window, if any.
fn range_header(query: &ContactListQuery) -> Option<String> {
    query.pagination.as_ref().map(|pagination| {
        let (from, to) = pagination.range();
        format!("{from}-{to}")
    })
}

/// Total from a `Content-Range` header such as `0-19/42` or `*/0`.
fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

/// Turns a non-success response into the backend's own message.
async fn error_from_response(response: Response) -> RepositoryError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<PostgrestErrorBody>(&body)
        .map(|err| err.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body
            }
        });
    RepositoryError::Backend(message)
}

impl PostgrestRepository {
    /// Creates a client for `{base_url}/rest/v1/Contatos` authenticated with
    /// the project's API key.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> RepositoryResult<Self> {
        let table_url = Url::parse(&format!(
            "{}/rest/v1/{CONTACTS_TABLE}",
            base_url.trim_end_matches('/')
        ))
        .map_err(|e| RepositoryError::ConnectionError(format!("Invalid PostgREST url: {e}")))?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key)
            .map_err(|e| RepositoryError::ConnectionError(format!("Invalid API key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RepositoryError::ConnectionError(format!("Invalid API key: {e}")))?;
        headers.insert("apikey", key);
        headers.insert(header::AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, table_url })
    }
}

impl ContactReader for PostgrestRepository {
    async fn list_contacts(&self, query: &ContactListQuery) -> RepositoryResult<Vec<Contact>> {
        let mut request = self
            .client
            .get(self.table_url.clone())
            .query(&select_params(query));
        if let Some(range) = range_header(query) {
            request = request
                .header("Range-Unit", "items")
                .header(header::RANGE, range);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json::<Vec<ContactRow>>()
            .await?
            .into_iter()
            .map(Contact::try_from)
            .collect()
    }

    async fn count_contacts(&self, query: &ContactListQuery) -> RepositoryResult<usize> {
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(filter_params(query));

        let response = self
            .client
            .head(self.table_url.clone())
            .query(&params)
            .header("Prefer", "count=exact")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| RepositoryError::Backend("Missing row count in response".to_string()))
    }
}

impl ContactWriter for PostgrestRepository {
    async fn create_contact(&self, contact: &NewContact) -> RepositoryResult<()> {
        let rows = [InsertRow::from(contact)];
        let response = self
            .client
            .post(self.table_url.clone())
            .header("Prefer", "return=minimal")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(())
    }
}
