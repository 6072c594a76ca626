//! Pure query construction: filters, sorting, and pagination.
//!
//! Nothing in this module touches the store. Filters are equality conditions
//! on top-level document fields; [`PageRequest`] converts page/per-page
//! parameters into the skip/limit window a store understands.

use serde_json::Value;

/// An equality condition on a single document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// The top-level field name
    pub field: String,
    /// The value the field must equal
    pub value: Value,
}

/// A conjunction of equality conditions.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates an empty filter that matches everything.
    pub const fn new() -> Self {
        Self {
            conditions: Vec::new(),
        }
    }

    /// Adds an equality condition on a field.
    #[must_use]
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// The conditions in this filter.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Whether the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluates the filter against a document body.
    pub fn matches(&self, body: &Value) -> bool {
        self.conditions
            .iter()
            .all(|condition| body.get(&condition.field) == Some(&condition.value))
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// A sort key: field plus direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The top-level field to sort by
    pub field: String,
    /// The direction
    pub order: SortOrder,
}

/// Configuration for list reads: sort plus a skip/limit window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FindOptions {
    /// Optional sort key; stores fall back to id order without one
    pub sort: Option<Sort>,
    /// Documents to skip from the start of the result
    pub skip: Option<u64>,
    /// Maximum documents to return
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Creates options with no sort and no window.
    pub const fn new() -> Self {
        Self {
            sort: None,
            skip: None,
            limit: None,
        }
    }

    /// Sets the sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            order,
        });
        self
    }

    /// Sets the number of documents to skip.
    #[must_use]
    pub const fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A page request from the caller's pagination parameters.
///
/// Pure construction: pages are 1-based, per-page is clamped to
/// [`PageRequest::MAX_PER_PAGE`], and [`PageRequest::options`] produces the
/// skip/limit window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    per_page: usize,
}

impl PageRequest {
    /// Hard cap on page size.
    pub const MAX_PER_PAGE: usize = 100;

    /// Default page size.
    pub const DEFAULT_PER_PAGE: usize = 20;

    /// Creates a page request; page 0 is treated as page 1 and per-page is
    /// clamped into `1..=MAX_PER_PAGE`.
    pub fn new(page: u64, per_page: usize) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// The first page with the default page size.
    pub fn first() -> Self {
        Self::new(1, Self::DEFAULT_PER_PAGE)
    }

    /// The 1-based page number.
    pub const fn page(self) -> u64 {
        self.page
    }

    /// The effective page size.
    pub const fn per_page(self) -> usize {
        self.per_page
    }

    /// The skip/limit window for this page.
    pub fn options(self) -> FindOptions {
        FindOptions::new()
            .with_skip((self.page - 1) * self.per_page as u64)
            .with_limit(self.per_page)
    }

    /// The skip/limit window with a sort key.
    pub fn options_sorted(self, field: impl Into<String>, order: SortOrder) -> FindOptions {
        self.options().sort_by(field, order)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = Filter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&json!({"status": "pending"})));
        assert!(filter.matches(&json!({})));
    }

    #[test]
    fn filter_matches_on_all_conditions() {
        let filter = Filter::new()
            .field_eq("status", "pending")
            .field_eq("user_id", "USR-A1");

        assert!(filter.matches(&json!({"status": "pending", "user_id": "USR-A1", "total": 30})));
        assert!(!filter.matches(&json!({"status": "shipped", "user_id": "USR-A1"})));
        assert!(!filter.matches(&json!({"status": "pending"})));
    }

    #[test]
    fn filter_distinguishes_value_types() {
        let filter = Filter::new().field_eq("count", 2);
        assert!(filter.matches(&json!({"count": 2})));
        assert!(!filter.matches(&json!({"count": "2"})));
    }

    #[test]
    fn find_options_builder() {
        let options = FindOptions::new()
            .sort_by("created_at", SortOrder::Descending)
            .with_skip(40)
            .with_limit(20);

        assert_eq!(options.skip, Some(40));
        assert_eq!(options.limit, Some(20));
        let sort = options.sort.unwrap();
        assert_eq!(sort.field, "created_at");
        assert_eq!(sort.order, SortOrder::Descending);
    }

    #[test]
    fn page_request_window_arithmetic() {
        let page = PageRequest::new(3, 25);
        let options = page.options();
        assert_eq!(options.skip, Some(50));
        assert_eq!(options.limit, Some(25));
    }

    #[test]
    fn page_request_clamps_inputs() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.page(), 1);
        assert_eq!(page.per_page(), 1);

        let page = PageRequest::new(1, 10_000);
        assert_eq!(page.per_page(), PageRequest::MAX_PER_PAGE);
    }

    #[test]
    fn first_page_skips_nothing() {
        let options = PageRequest::first().options();
        assert_eq!(options.skip, Some(0));
        assert_eq!(options.limit, Some(PageRequest::DEFAULT_PER_PAGE));
    }
}
