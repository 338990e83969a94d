use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{constants::MAX_PAGE_SIZE, error::RecipeError};

/// Highest page whose offset still fits in an `i64` at the largest page size.
const MAX_PAGE: i64 = i64::MAX / MAX_PAGE_SIZE;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct PageContext<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> PageContext<T> {
    /// Builds a page from rows carrying a `COUNT(*) OVER()` total. A page past the end has
    /// no rows to carry that total and is reported as unknown rather than as empty.
    pub fn from_rows(
        rows: Vec<T>,
        total_rows: i64,
        pagination: &Pagination,
    ) -> Result<Self, RecipeError> {
        if rows.is_empty() {
            if pagination.page > 1 {
                return Err(RecipeError::UnknownResource(String::from("Invalid page")));
            }
            return Ok(Self::no_rows());
        }

        let next = if pagination.offset().saturating_add(pagination.limit) < total_rows {
            Some(pagination.page + 1)
        } else {
            None
        };

        Ok(Self {
            count: total_rows,
            next,
            previous: (pagination.page > 1).then(|| pagination.page - 1),
            results: rows,
        })
    }

    fn no_rows() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: vec![],
        }
    }
}

/// `page` is 1-based and capped so the offset cannot overflow; `limit` is clamped to
/// `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_query(query: &HashMap<String, String>, default_limit: i64) -> Self {
        let page = query
            .get("page")
            .and_then(|page| page.parse().ok())
            .unwrap_or(1);
        let limit = query
            .get("limit")
            .and_then(|limit| limit.parse().ok())
            .unwrap_or(default_limit);

        Self::new(page, limit)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_for_missing_or_garbage_params() {
        assert_eq!(Pagination::from_query(&query(&[]), 6), Pagination::new(1, 6));
        assert_eq!(
            Pagination::from_query(&query(&[("page", "x"), ("limit", "-")]), 6),
            Pagination::new(1, 6)
        );
    }

    #[test]
    fn limit_and_page_are_clamped() {
        let pagination = Pagination::from_query(&query(&[("page", "0"), ("limit", "5000")]), 6);
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.limit, MAX_PAGE_SIZE);
        assert_eq!(pagination.offset(), 0);
    }

    #[test]
    fn middle_page_links_both_ways() {
        let pagination = Pagination::new(2, 6);
        let page = PageContext::from_rows(vec![1, 2, 3, 4, 5, 6], 20, &pagination).unwrap();

        assert_eq!(page.count, 20);
        assert_eq!(page.next, Some(3));
        assert_eq!(page.previous, Some(1));
    }

    #[test]
    fn last_page_has_no_next() {
        let pagination = Pagination::new(4, 6);
        let page = PageContext::from_rows(vec![19, 20], 20, &pagination).unwrap();

        assert_eq!(page.next, None);
        assert_eq!(page.previous, Some(3));
    }

    #[test]
    fn empty_first_page_is_an_empty_listing() {
        let page: PageContext<i32> =
            PageContext::from_rows(vec![], 0, &Pagination::new(1, 6)).unwrap();

        assert_eq!(page.count, 0);
        assert!(page.results.is_empty());
        assert_eq!(page.next, None);
        assert_eq!(page.previous, None);
    }

    #[test]
    fn page_past_the_end_is_unknown() {
        let page: Result<PageContext<i32>, _> =
            PageContext::from_rows(vec![], 0, &Pagination::new(9, 6));

        assert!(matches!(page, Err(RecipeError::UnknownResource(_))));
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let max = i64::MAX.to_string();
        let pagination = Pagination::from_query(&query(&[("page", max.as_str()), ("limit", "100")]), 6);

        assert_eq!(pagination.page, MAX_PAGE);
        assert!(pagination.offset() > 0);

        let page = PageContext::from_rows(vec![1], 1, &pagination).unwrap();
        assert_eq!(page.next, None);
    }
}
