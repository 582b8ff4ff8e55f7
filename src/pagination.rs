use serde::{Deserialize, Serialize};

/// How the total number of matching rows is obtained for a listing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    /// Issue a count request next to every page request.
    #[default]
    Exact,
    /// Never count; a full page is the only hint that more rows exist.
    #[serde(rename = "none")]
    Skip,
}

/// Number of pages needed to show `total` rows, `per_page` at a time.
pub fn total_pages(total: usize, per_page: usize) -> usize {
    total.div_ceil(per_page.max(1))
}

/// Page numbers to render as links, `None` standing for an ellipsis.
fn get_pages(
    total_pages: usize,
    current_page: usize,
    left_edge: usize,
    left_current: usize,
    right_current: usize,
    right_edge: usize,
) -> Vec<Option<usize>> {
    let last_page = total_pages;

    if last_page == 0 {
        return vec![];
    }

    let mut pages = Vec::new();

    let left_end = (1 + left_edge).min(last_page + 1);
    pages.extend((1..left_end).map(Some));

    let mid_start = left_end.max(current_page.saturating_sub(left_current));
    let mid_end = current_page
        .saturating_add(right_current + 1)
        .min(last_page.saturating_add(1));

    if mid_start > left_end {
        pages.push(None);
    }
    pages.extend((mid_start..mid_end).map(Some));

    let right_start = mid_end.max(last_page.saturating_sub(right_edge) + 1);

    if right_start > mid_end {
        pages.push(None);
    }
    pages.extend((right_start..=last_page).map(Some));

    pages
}

/// One page of items together with the navigation state of the listing.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    /// Numbered links; empty when the total is unknown.
    pub pages: Vec<Option<usize>>,
    pub page: usize,
    pub total_pages: Option<usize>,
    pub has_previous: bool,
    pub has_next: bool,
}

impl<T> Paginated<T> {
    pub fn new(
        items: Vec<T>,
        current_page: usize,
        total_pages: Option<usize>,
        has_previous: bool,
        has_next: bool,
    ) -> Self {
        let current_page = current_page.max(1);

        let pages = total_pages
            .map(|total| get_pages(total, current_page, 2, 2, 4, 2))
            .unwrap_or_default();

        Self {
            items,
            pages,
            page: current_page,
            total_pages,
            has_previous,
            has_next,
        }
    }
}
