//! Search filters kept in lockstep with the page query string.
//!
//! [`FilterQuerySync`] owns the canonical [`FilterState`] and the query
//! string derived from it. Every mutation republishes the query before it
//! returns, so any fetch started afterwards sees a consistent snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::debug;
use url::{Url, form_urlencoded};

use crate::models::Pagination;

/// Filter errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Offset must be non-negative, got {0}")]
    NegativeOffset(i64),

    #[error("Unknown filter key: {0}")]
    UnknownKey(String),
}

/// Named filter keys, in query-string order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKey {
    Search,
    Category,
    Subcategory,
    MinPrice,
    MaxPrice,
    Location,
    AdType,
}

impl FilterKey {
    pub const ALL: [FilterKey; 7] = [
        FilterKey::Search,
        FilterKey::Category,
        FilterKey::Subcategory,
        FilterKey::MinPrice,
        FilterKey::MaxPrice,
        FilterKey::Location,
        FilterKey::AdType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKey::Search => "search",
            FilterKey::Category => "category",
            FilterKey::Subcategory => "subcategory",
            FilterKey::MinPrice => "min_price",
            FilterKey::MaxPrice => "max_price",
            FilterKey::Location => "location",
            FilterKey::AdType => "ad_type",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| FilterError::UnknownKey(s.to_string()))
    }
}

const OFFSET_PARAM: &str = "offset";
const LIMIT_PARAM: &str = "limit";

/// Whitespace-only values mean "no constraint".
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// FilterState
// =============================================================================

/// Active filters plus pagination. An absent key is no constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    values: BTreeMap<FilterKey, String>,
    offset: u64,
    limit: u32,
}

impl FilterState {
    pub fn new(limit: u32) -> Self {
        Self {
            values: BTreeMap::new(),
            offset: 0,
            limit: limit.max(1),
        }
    }

    /// Builder-style setter; empty values remove the key.
    pub fn with(mut self, key: FilterKey, value: &str) -> Self {
        self.put(key, Some(value));
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    fn put(&mut self, key: FilterKey, value: Option<&str>) {
        match normalize(value) {
            Some(v) => {
                self.values.insert(key, v);
            }
            None => {
                self.values.remove(&key);
            }
        }
    }

    pub fn get(&self, key: FilterKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    pub fn contains(&self, key: FilterKey) -> bool {
        self.values.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = FilterKey> + '_ {
        self.values.keys().copied()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Pairs published in the page URL: present filters, then `offset`
    /// when it is not zero.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs: Vec<(&'static str, String)> = self
            .values
            .iter()
            .map(|(key, value)| (key.as_str(), value.clone()))
            .collect();
        if self.offset > 0 {
            pairs.push((OFFSET_PARAM, self.offset.to_string()));
        }
        pairs
    }

    /// Pairs sent to the listing endpoint: filters plus `limit` and `offset`.
    pub fn api_params(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .values
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value.clone()))
            .collect();
        pairs.push((LIMIT_PARAM.to_string(), self.limit.to_string()));
        pairs.push((OFFSET_PARAM.to_string(), self.offset.to_string()));
        pairs
    }

    pub fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query_pairs())
            .finish()
    }

    /// Decode a query string (with or without the leading `?`).
    ///
    /// Unknown keys and empty values are dropped, `limit` is ignored in
    /// favour of the configured page size, and an unparseable `offset`
    /// reads as 0.
    pub fn from_query(query: &str, limit: u32) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut state = Self::new(limit);
        for (name, value) in form_urlencoded::parse(query.as_bytes()) {
            if name == OFFSET_PARAM {
                state.offset = value.trim().parse::<u64>().unwrap_or(0);
            } else if let Ok(key) = name.parse::<FilterKey>() {
                state.put(key, Some(&value));
            }
        }
        state
    }
}

// =============================================================================
// FilterQuerySync
// =============================================================================

/// Filter state synchronized with the page query string.
#[derive(Debug, Clone)]
pub struct FilterQuerySync {
    state: FilterState,
    query: String,
    /// Last pagination block received for the current filters.
    pagination: Option<Pagination>,
    /// Live text of the search box; committed only by [`Self::submit_search`].
    search_draft: String,
}

impl FilterQuerySync {
    pub fn new(page_size: u32) -> Self {
        Self::from_state(FilterState::new(page_size))
    }

    /// Restore state from a page query string (reload or shared link).
    pub fn from_query(query: &str, page_size: u32) -> Self {
        Self::from_state(FilterState::from_query(query, page_size))
    }

    pub fn from_url(url: &Url, page_size: u32) -> Self {
        Self::from_query(url.query().unwrap_or_default(), page_size)
    }

    fn from_state(state: FilterState) -> Self {
        let search_draft = state.get(FilterKey::Search).unwrap_or_default().to_string();
        let mut sync = Self {
            state,
            query: String::new(),
            pagination: None,
            search_draft,
        };
        sync.publish();
        sync
    }

    fn publish(&mut self) {
        self.query = self.state.to_query();
        debug!(query = %self.query, "filters published");
    }

    /// Set or remove a filter. Any change resets the offset to 0.
    pub fn set_filter(&mut self, key: FilterKey, value: Option<&str>) {
        self.state.put(key, value);
        if key == FilterKey::Search {
            self.search_draft = self.state.get(key).unwrap_or_default().to_string();
        }
        self.state.offset = 0;
        self.pagination = None;
        self.publish();
    }

    /// Remove every filter and go back to the first page.
    pub fn clear_all(&mut self) {
        self.state.values.clear();
        self.state.offset = 0;
        self.pagination = None;
        self.search_draft.clear();
        self.publish();
    }

    /// Move to `offset`, snapped down to a page boundary and, when the total
    /// is known, clamped to the last page. Returns the applied offset.
    pub fn set_offset(&mut self, offset: i64) -> Result<u64, FilterError> {
        if offset < 0 {
            return Err(FilterError::NegativeOffset(offset));
        }
        let limit = u64::from(self.state.limit);
        let mut applied = (offset as u64 / limit) * limit;
        if let Some(total) = self.total()
            && applied >= total
        {
            applied = total.saturating_sub(1) / limit * limit;
        }
        self.state.offset = applied;
        self.publish();
        Ok(applied)
    }

    /// Record the pagination block of a listing response for the current filters.
    pub fn record_page(&mut self, pagination: Pagination) {
        self.pagination = Some(pagination);
    }

    /// Total result count for the current filters, when known.
    pub fn total(&self) -> Option<u64> {
        self.pagination.map(|p| p.total)
    }

    /// Advance one page if the last response said there is one.
    pub fn next_page(&mut self) -> Option<u64> {
        if !self.pagination?.has_next {
            return None;
        }
        let next = self.state.offset + u64::from(self.state.limit);
        self.set_offset(i64::try_from(next).ok()?).ok()
    }

    /// Go back one page if not already on the first.
    pub fn previous_page(&mut self) -> Option<u64> {
        if self.state.offset == 0 {
            return None;
        }
        let prev = self.state.offset.saturating_sub(u64::from(self.state.limit));
        self.set_offset(i64::try_from(prev).ok()?).ok()
    }

    /// Update the live search text without touching filters or the URL.
    pub fn set_search_draft(&mut self, text: impl Into<String>) {
        self.search_draft = text.into();
    }

    pub fn search_draft(&self) -> &str {
        &self.search_draft
    }

    /// Commit the search draft into the filters.
    pub fn submit_search(&mut self) {
        let draft = self.search_draft.clone();
        self.set_filter(FilterKey::Search, Some(&draft));
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Current query string, without the leading `?`.
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// `base` with its query replaced by the current filters.
    pub fn url(&self, base: &Url) -> Url {
        let mut url = base.clone();
        if self.query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&self.query));
        }
        url
    }
}

// =============================================================================
// Stale response guard
// =============================================================================

/// Ticket handed out for one listing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

/// Last-write-wins by initiation order for overlapping fetches.
///
/// Issue a ticket before sending; apply the response only if
/// [`LatestRequest::is_current`] still holds for its ticket.
#[derive(Debug, Default)]
pub struct LatestRequest {
    issued: AtomicU64,
}

impl LatestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> RequestTicket {
        RequestTicket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total: u64, offset: u64, has_next: bool) -> Pagination {
        Pagination {
            total,
            limit: 20,
            offset,
            has_next,
            has_previous: offset > 0,
        }
    }

    #[test]
    fn filter_change_resets_offset() {
        let mut sync = FilterQuerySync::new(20);
        assert_eq!(sync.set_offset(40), Ok(40));
        assert_eq!(sync.query_string(), "offset=40");

        sync.set_filter(FilterKey::Category, Some("3"));

        assert_eq!(sync.state().offset(), 0);
        assert_eq!(sync.query_string(), "category=3");
    }

    #[test]
    fn empty_value_removes_key() {
        let mut sync = FilterQuerySync::new(20);
        sync.set_filter(FilterKey::MinPrice, Some("10"));
        sync.set_filter(FilterKey::MinPrice, Some("  "));
        assert!(!sync.state().contains(FilterKey::MinPrice));
        sync.set_filter(FilterKey::MaxPrice, Some("50"));
        sync.set_filter(FilterKey::MaxPrice, None);
        assert_eq!(sync.query_string(), "");
    }

    #[test]
    fn query_keys_match_state_keys() {
        let mut sync = FilterQuerySync::new(20);
        sync.set_filter(FilterKey::AdType, Some("sale"));
        sync.set_filter(FilterKey::Search, Some("red bike"));
        sync.set_filter(FilterKey::Location, Some("9"));

        let decoded: Vec<String> = form_urlencoded::parse(sync.query_string().as_bytes())
            .map(|(k, _)| k.into_owned())
            .collect();
        let keys: Vec<String> = sync.state().keys().map(|k| k.to_string()).collect();
        assert_eq!(decoded, keys);
        assert_eq!(sync.query_string(), "search=red+bike&location=9&ad_type=sale");
    }

    #[test]
    fn query_round_trip_preserves_state() {
        let state = FilterState::new(20)
            .with(FilterKey::Search, "caf\u{e9} & bar")
            .with(FilterKey::Category, "3")
            .with(FilterKey::Subcategory, "17")
            .with(FilterKey::MinPrice, "10.5")
            .with(FilterKey::MaxPrice, "99")
            .with(FilterKey::Location, "4")
            .with(FilterKey::AdType, "rent")
            .with_offset(60);
        assert_eq!(FilterState::from_query(&state.to_query(), 20), state);

        let sparse = FilterState::new(20).with(FilterKey::MaxPrice, "5");
        assert_eq!(FilterState::from_query(&sparse.to_query(), 20), sparse);
    }

    #[test]
    fn decoding_ignores_unknown_keys_and_bad_offset() {
        let state = FilterState::from_query("?utm_source=x&category=2&offset=abc&limit=500", 20);
        assert_eq!(state.get(FilterKey::Category), Some("2"));
        assert_eq!(state.offset(), 0);
        assert_eq!(state.limit(), 20);
        assert_eq!(state.keys().count(), 1);
    }

    #[test]
    fn negative_offset_is_rejected() {
        let mut sync = FilterQuerySync::new(20);
        sync.set_offset(20).unwrap();
        assert_eq!(sync.set_offset(-1), Err(FilterError::NegativeOffset(-1)));
        assert_eq!(sync.state().offset(), 20);
    }

    #[test]
    fn offset_snaps_to_page_boundary_and_total() {
        let mut sync = FilterQuerySync::new(20);
        assert_eq!(sync.set_offset(45), Ok(40));

        sync.record_page(page(41, 40, false));
        assert_eq!(sync.set_offset(400), Ok(40));

        sync.record_page(page(40, 20, false));
        assert_eq!(sync.set_offset(40), Ok(20));

        sync.record_page(page(0, 0, false));
        assert_eq!(sync.set_offset(20), Ok(0));
    }

    #[test]
    fn search_draft_is_committed_only_on_submit() {
        let mut sync = FilterQuerySync::new(20);
        sync.set_search_draft("b");
        sync.set_search_draft("bi");
        sync.set_search_draft("bike");
        assert_eq!(sync.query_string(), "");

        sync.submit_search();
        assert_eq!(sync.state().get(FilterKey::Search), Some("bike"));
        assert_eq!(sync.query_string(), "search=bike");
    }

    #[test]
    fn page_navigation_follows_pagination() {
        let mut sync = FilterQuerySync::new(20);
        assert_eq!(sync.next_page(), None);

        sync.record_page(page(55, 0, true));
        assert_eq!(sync.next_page(), Some(20));
        sync.record_page(page(55, 20, true));
        assert_eq!(sync.next_page(), Some(40));
        sync.record_page(page(55, 40, false));
        assert_eq!(sync.next_page(), None);
        assert_eq!(sync.previous_page(), Some(20));
    }

    #[test]
    fn clear_all_empties_query_and_draft() {
        let mut sync = FilterQuerySync::from_query("search=sofa&category=2&offset=20", 20);
        assert_eq!(sync.search_draft(), "sofa");
        sync.clear_all();
        assert!(sync.state().is_empty());
        assert_eq!(sync.state().offset(), 0);
        assert_eq!(sync.query_string(), "");
        assert_eq!(sync.search_draft(), "");
    }

    #[test]
    fn url_carries_current_query() {
        let base = Url::parse("https://stardust.test/ads?stale=1").unwrap();
        let mut sync = FilterQuerySync::from_url(&base, 20);
        assert!(sync.state().is_empty());
        assert_eq!(sync.url(&base).as_str(), "https://stardust.test/ads");

        sync.set_filter(FilterKey::Category, Some("3"));
        assert_eq!(
            sync.url(&base).as_str(),
            "https://stardust.test/ads?category=3"
        );
    }

    #[test]
    fn api_params_always_carry_limit_and_offset() {
        let state = FilterState::new(20).with(FilterKey::Category, "3");
        assert_eq!(
            state.api_params(),
            vec![
                ("category".to_string(), "3".to_string()),
                ("limit".to_string(), "20".to_string()),
                ("offset".to_string(), "0".to_string()),
            ]
        );
    }

    #[test]
    fn only_latest_ticket_is_current() {
        let latest = LatestRequest::new();
        let first = latest.issue();
        let second = latest.issue();
        assert!(!latest.is_current(first));
        assert!(latest.is_current(second));
    }
}
