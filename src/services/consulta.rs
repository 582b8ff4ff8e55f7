//! Filtered, paginated contact listing.

use serde::{Deserialize, Serialize};

use crate::domain::contact::Contact;
use crate::dto::consulta::ConsultaPageData;
use crate::forms::consulta::ConsultaQuery;
use crate::pagination::{CountMode, Paginated, total_pages};
use crate::repository::errors::RepositoryResult;
use crate::repository::{ContactFilters, ContactListQuery, ContactReader};

/// Tag of one issued fetch; only the latest one may update the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket(u64);

/// Outcome of the last completed fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    pub rows: Vec<Contact>,
    pub total_count: Option<usize>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Listing state carried between requests of one browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultaState {
    pub filters: ContactFilters,
    pub page: usize,
    pub total_count: Option<usize>,
}

#[derive(Debug)]
pub struct ListQueryModel {
    filters: ContactFilters,
    page: usize,
    page_size: usize,
    count_mode: CountMode,
    result: PageResult,
    issued: u64,
}

impl ListQueryModel {
    pub fn new(page_size: usize, count_mode: CountMode) -> Self {
        Self {
            filters: ContactFilters::default(),
            page: 1,
            page_size: page_size.max(1),
            count_mode,
            result: PageResult::default(),
            issued: 0,
        }
    }

    /// Picks up where a previous request of the same browser left off.
    pub fn restore(&mut self, state: ConsultaState) {
        self.filters = state.filters;
        self.page = state.page.max(1);
        self.result.total_count = match self.count_mode {
            CountMode::Exact => state.total_count,
            CountMode::Skip => None,
        };
    }

    pub fn state(&self) -> ConsultaState {
        ConsultaState {
            filters: self.filters.clone(),
            page: self.page,
            total_count: self.result.total_count,
        }
    }

    pub fn filters(&self) -> &ContactFilters {
        &self.filters
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn result(&self) -> &PageResult {
        &self.result
    }

    /// Applies new filter values; any change sends the listing back to page 1
    /// and drops the rows fetched under the old filters.
    pub fn set_filters(&mut self, filters: ContactFilters) -> bool {
        if filters == self.filters {
            return false;
        }
        self.filters = filters;
        self.page = 1;
        self.result.rows.clear();
        self.result.total_count = None;
        true
    }

    pub fn set_page_size(&mut self, page_size: usize) -> bool {
        let page_size = page_size.max(1);
        if page_size == self.page_size {
            return false;
        }
        self.page_size = page_size;
        self.page = 1;
        true
    }

    /// Last page implied by the known total; at least 1.
    pub fn last_page(&self) -> Option<usize> {
        self.result
            .total_count
            .map(|total| total_pages(total, self.page_size).max(1))
    }

    pub fn go_to(&mut self, page: usize) {
        let mut page = page.max(1);
        if let Some(last) = self.last_page() {
            page = page.min(last);
        }
        self.page = page;
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        match self.count_mode {
            CountMode::Exact => self.last_page().is_some_and(|last| self.page < last),
            CountMode::Skip => self.result.rows.len() >= self.page_size,
        }
    }

    /// Issues a new fetch for the current filters and page. Prior rows stay
    /// visible until it completes.
    pub fn begin(&mut self) -> (RequestTicket, ContactListQuery) {
        self.issued += 1;
        self.result.is_loading = true;
        let query = ContactListQuery::new()
            .filters(self.filters.clone())
            .paginate(self.page, self.page_size);
        (RequestTicket(self.issued), query)
    }

    /// Records the outcome of a fetch. Returns `false` and leaves the model
    /// untouched when a newer fetch has been issued since.
    pub fn complete(
        &mut self,
        ticket: RequestTicket,
        outcome: RepositoryResult<(Vec<Contact>, Option<usize>)>,
    ) -> bool {
        if ticket.0 != self.issued {
            log::debug!(
                "Discarding stale contact listing {} (latest {})",
                ticket.0,
                self.issued
            );
            return false;
        }

        self.result = match outcome {
            Ok((rows, total_count)) => PageResult {
                rows,
                total_count,
                is_loading: false,
                error: None,
            },
            Err(err) => {
                log::error!("Failed to list contacts: {err}");
                PageResult {
                    rows: Vec::new(),
                    total_count: match self.count_mode {
                        CountMode::Exact => Some(0),
                        CountMode::Skip => None,
                    },
                    is_loading: false,
                    error: Some(err.to_string()),
                }
            }
        };
        true
    }

    pub async fn refresh<R>(&mut self, repo: &R) -> bool
    where
        R: ContactReader,
    {
        let (ticket, query) = self.begin();
        let outcome = fetch(repo, &query, self.count_mode).await;
        self.complete(ticket, outcome)
    }

    pub fn into_page_data(self) -> ConsultaPageData {
        let has_previous = self.has_previous();
        let has_next = self.has_next();
        let total_pages = self.last_page();
        ConsultaPageData {
            contacts: Paginated::new(
                self.result.rows,
                self.page,
                total_pages,
                has_previous,
                has_next,
            ),
            filters: self.filters,
            error: self.result.error,
        }
    }
}

/// One listing request plus, when counting, one count under the same filters.
async fn fetch<R>(
    repo: &R,
    query: &ContactListQuery,
    count_mode: CountMode,
) -> RepositoryResult<(Vec<Contact>, Option<usize>)>
where
    R: ContactReader,
{
    let rows = repo.list_contacts(query).await?;
    let total = match count_mode {
        CountMode::Exact => Some(repo.count_contacts(query).await?),
        CountMode::Skip => None,
    };
    Ok((rows, total))
}

/// Loads the consulta page for a browser whose previous listing state is
/// `state`, applying the filters and page requested in `query`.
pub async fn load_consulta_page<R>(
    repo: &R,
    page_size: usize,
    count_mode: CountMode,
    state: Option<ConsultaState>,
    query: ConsultaQuery,
) -> (ConsultaPageData, ConsultaState)
where
    R: ContactReader,
{
    let mut model = ListQueryModel::new(page_size, count_mode);
    if let Some(state) = state {
        model.restore(state);
    }

    let current = model.filters().clone();
    let filters = ContactFilters::new(
        query.nome.unwrap_or(current.full_name),
        query.email.unwrap_or(current.email),
        query.celular.unwrap_or(current.phone),
    );
    let changed = model.set_filters(filters);
    if let (false, Some(page)) = (changed, query.page) {
        model.go_to(page);
    }

    model.refresh(repo).await;

    if let Some(last) = model.last_page()
        && model.result().error.is_none()
        && model.page() > last
    {
        model.go_to(last);
        model.refresh(repo).await;
    }

    let state = model.state();
    (model.into_page_data(), state)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::contact::NewContact;
    use crate::repository::errors::RepositoryError;
    use crate::repository::{ContactWriter, MemoryRepository};

    async fn seeded(names: &[&str]) -> MemoryRepository {
        let repo = MemoryRepository::new();
        for name in names {
            repo.create_contact(&NewContact {
                full_name: name.to_string(),
                phone: String::new(),
                postal_code: String::new(),
                email: String::new(),
                linkedin_url: String::new(),
                registered_at: Utc::now(),
            })
            .await
            .unwrap();
        }
        repo
    }

    fn names(model: &ListQueryModel) -> Vec<&str> {
        model
            .result()
            .rows
            .iter()
            .filter_map(|c| c.full_name.as_deref())
            .collect()
    }

    #[tokio::test]
    async fn name_filter_matches_case_insensitively_in_name_order() {
        let repo = seeded(&["Carlos", "Ana Silva", "ANA PAULA"]).await;
        let mut model = ListQueryModel::new(20, CountMode::Exact);
        model.set_filters(ContactFilters::new("ana", "", ""));
        assert!(model.refresh(&repo).await);

        assert_eq!(names(&model), vec!["ANA PAULA", "Ana Silva"]);
        assert_eq!(model.result().total_count, Some(2));
        assert_eq!(model.result().error, None);
    }

    #[tokio::test]
    async fn filter_change_resets_the_page_before_fetching() {
        let repo = seeded(&["a", "b", "c", "d", "e"]).await;
        let mut model = ListQueryModel::new(2, CountMode::Exact);
        model.refresh(&repo).await;
        model.go_to(3);
        assert_eq!(model.page(), 3);

        model.set_filters(ContactFilters::new("", "", ""));
        assert_eq!(model.page(), 3);

        model.set_filters(ContactFilters::new("a", "", ""));
        assert_eq!(model.page(), 1);
        let (_, query) = model.begin();
        assert_eq!(query.pagination.map(|p| p.range()), Some((0, 1)));
    }

    #[tokio::test]
    async fn page_size_change_resets_the_page() {
        let mut model = ListQueryModel::new(2, CountMode::Exact);
        model.go_to(4);
        assert!(model.set_page_size(10));
        assert_eq!(model.page(), 1);
        assert!(!model.set_page_size(10));
    }

    #[tokio::test]
    async fn navigation_with_known_total() {
        let repo = seeded(&["a", "b", "c", "d", "e"]).await;
        let mut model = ListQueryModel::new(2, CountMode::Exact);
        model.refresh(&repo).await;
        assert!(!model.has_previous());
        assert!(model.has_next());

        model.go_to(10);
        assert_eq!(model.page(), 3);
        model.refresh(&repo).await;
        assert_eq!(names(&model), vec!["e"]);
        assert!(model.has_previous());
        assert!(!model.has_next());

        model.go_to(0);
        assert_eq!(model.page(), 1);
    }

    #[tokio::test]
    async fn countless_next_follows_full_pages() {
        let repo = seeded(&["a", "b", "c", "d"]).await;
        let mut model = ListQueryModel::new(2, CountMode::Skip);
        model.refresh(&repo).await;
        assert_eq!(model.result().total_count, None);
        assert!(model.has_next());

        model.go_to(2);
        model.refresh(&repo).await;
        assert!(model.has_next());

        model.go_to(3);
        model.refresh(&repo).await;
        assert!(model.result().rows.is_empty());
        assert!(!model.has_next());
    }

    #[tokio::test]
    async fn failure_reports_backend_message_and_clears_rows() {
        let repo = seeded(&["a", "b"]).await;
        let mut model = ListQueryModel::new(20, CountMode::Exact);
        model.refresh(&repo).await;
        assert_eq!(model.result().rows.len(), 2);

        repo.fail_with("permission denied for table Contatos").await;
        model.refresh(&repo).await;
        assert_eq!(
            model.result().error.as_deref(),
            Some("permission denied for table Contatos")
        );
        assert!(model.result().rows.is_empty());
        assert_eq!(model.result().total_count, Some(0));
        assert!(!model.result().is_loading);
    }

    #[tokio::test]
    async fn rows_stay_visible_while_a_fetch_is_in_flight() {
        let repo = seeded(&["a"]).await;
        let mut model = ListQueryModel::new(20, CountMode::Exact);
        model.refresh(&repo).await;

        let _ = model.begin();
        assert!(model.result().is_loading);
        assert_eq!(names(&model), vec!["a"]);
    }

    #[test]
    fn stale_responses_are_discarded() {
        let mut model = ListQueryModel::new(20, CountMode::Exact);
        let (older, _) = model.begin();
        let (newer, _) = model.begin();

        assert!(model.complete(newer, Ok((Vec::new(), Some(0)))));
        assert!(!model.complete(
            older,
            Err(RepositoryError::Backend("timeout".to_string()))
        ));
        assert_eq!(model.result().error, None);
        assert_eq!(model.result().total_count, Some(0));
    }

    #[tokio::test]
    async fn page_request_keeps_filters_and_clamps_to_last_page() {
        let repo = seeded(&["Ana", "Ana B", "Ana C", "Bruno"]).await;
        let (_, state) = load_consulta_page(
            &repo,
            2,
            CountMode::Exact,
            None,
            ConsultaQuery {
                nome: Some("ana".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(state.page, 1);
        assert_eq!(state.total_count, Some(3));

        let (data, state) = load_consulta_page(
            &repo,
            2,
            CountMode::Exact,
            Some(state),
            ConsultaQuery {
                page: Some(9),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(state.page, 2);
        assert_eq!(state.filters.full_name, "ana");
        assert_eq!(data.contacts.items.len(), 1);
        assert!(data.contacts.has_previous);
        assert!(!data.contacts.has_next);
    }

    #[tokio::test]
    async fn editing_a_filter_ignores_the_requested_page() {
        let repo = seeded(&["a", "b", "c"]).await;
        let state = ConsultaState {
            filters: ContactFilters::default(),
            page: 2,
            total_count: Some(3),
        };
        let (_, state) = load_consulta_page(
            &repo,
            1,
            CountMode::Exact,
            Some(state),
            ConsultaQuery {
                email: Some("x".to_string()),
                page: Some(2),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(state.page, 1);
        assert_eq!(state.total_count, Some(0));
    }

    #[tokio::test]
    async fn shrinking_result_moves_back_to_the_new_last_page() {
        let repo = seeded(&["a", "b", "c"]).await;
        let state = ConsultaState {
            filters: ContactFilters::default(),
            page: 3,
            total_count: Some(5),
        };
        let (data, state) =
            load_consulta_page(&repo, 1, CountMode::Exact, Some(state), ConsultaQuery::default())
                .await;
        assert_eq!(state.page, 3);
        assert_eq!(data.contacts.items.len(), 1);

        let (data, state) = load_consulta_page(
            &repo,
            2,
            CountMode::Exact,
            Some(ConsultaState {
                page: 5,
                total_count: Some(10),
                ..state
            }),
            ConsultaQuery::default(),
        )
        .await;
        assert_eq!(state.page, 2);
        assert_eq!(data.contacts.items.len(), 1);
    }

    #[tokio::test]
    async fn huge_page_number_on_first_visit_clamps_without_overflow() {
        let repo = seeded(&["Ana", "Bruno"]).await;
        let (data, state) = load_consulta_page(
            &repo,
            20,
            CountMode::Exact,
            None,
            ConsultaQuery {
                page: Some(usize::MAX / 10),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(state.page, 1);
        assert_eq!(data.contacts.items.len(), 2);
        assert_eq!(data.error, None);
    }

    #[tokio::test]
    async fn huge_page_number_without_counting_reads_as_empty() {
        let repo = seeded(&["Ana", "Bruno"]).await;
        let (data, state) = load_consulta_page(
            &repo,
            20,
            CountMode::Skip,
            None,
            ConsultaQuery {
                page: Some(usize::MAX),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(state.page, usize::MAX);
        assert!(data.contacts.items.is_empty());
        assert!(data.contacts.has_previous);
        assert!(!data.contacts.has_next);
    }
}
