//! Limit/offset pagination with a page-number aware response envelope.

use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::config::PaginationConfig;

const LIMIT_PARAM: &str = "limit";
const OFFSET_PARAM: &str = "offset";

/// The row window requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: i64,
    pub offset: i64,
}

impl LimitOffset {
    /// Resolve the window from raw query values.
    ///
    /// Returns `None` when the client sent no usable `limit` and no default
    /// page size is configured, meaning the list is returned unpaginated.
    /// A `limit` that is not a positive integer falls back to the default;
    /// an `offset` that is not a non-negative integer falls back to 0.
    pub fn from_query(
        limit: Option<&str>,
        offset: Option<&str>,
        config: &PaginationConfig,
    ) -> Option<Self> {
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .or(config.default_limit)?
            .min(config.max_limit);

        let offset = offset
            .and_then(|o| o.trim().parse::<i64>().ok())
            .filter(|o| *o >= 0)
            .unwrap_or(0);

        Some(Self { limit, offset })
    }

    /// 1-based page number of this window
    pub fn current_page(&self) -> i64 {
        if self.limit > 0 {
            self.offset / self.limit + 1
        } else {
            1
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub total_count: i64,
    pub limit: i64,
    pub offset: i64,
    pub current_page: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, total_count: i64, window: LimitOffset, uri: &Uri) -> Self {
        Self {
            total_count,
            limit: window.limit,
            offset: window.offset,
            current_page: window.current_page(),
            next: next_link(uri, total_count, window),
            previous: previous_link(uri, window),
            results,
        }
    }
}

fn next_link(uri: &Uri, total_count: i64, window: LimitOffset) -> Option<String> {
    // An offset too large to advance has no next page
    let next_offset = window
        .offset
        .checked_add(window.limit)
        .filter(|next| *next < total_count)?;

    let query = replace_query_param(uri.query(), LIMIT_PARAM, &window.limit.to_string());
    let query = replace_query_param(Some(&query), OFFSET_PARAM, &next_offset.to_string());
    Some(format!("{}?{}", uri.path(), query))
}

fn previous_link(uri: &Uri, window: LimitOffset) -> Option<String> {
    if window.offset <= 0 {
        return None;
    }

    let query = replace_query_param(uri.query(), LIMIT_PARAM, &window.limit.to_string());
    let query = if window.offset - window.limit <= 0 {
        remove_query_param(&query, OFFSET_PARAM)
    } else {
        replace_query_param(
            Some(&query),
            OFFSET_PARAM,
            &(window.offset - window.limit).to_string(),
        )
    };

    if query.is_empty() {
        Some(uri.path().to_string())
    } else {
        Some(format!("{}?{}", uri.path(), query))
    }
}

fn param_key(pair: &str) -> &str {
    pair.split_once('=').map(|(k, _)| k).unwrap_or(pair)
}

/// Set `key=value` in a raw query string, keeping other pairs untouched
fn replace_query_param(query: Option<&str>, key: &str, value: &str) -> String {
    let mut pairs: Vec<String> = query
        .unwrap_or("")
        .split('&')
        .filter(|pair| !pair.is_empty() && param_key(pair) != key)
        .map(str::to_string)
        .collect();
    pairs.push(format!("{}={}", key, value));
    pairs.sort_by(|a, b| param_key(a).cmp(param_key(b)));
    pairs.join("&")
}

fn remove_query_param(query: &str, key: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty() && param_key(pair) != key)
        .collect::<Vec<_>>()
        .join("&")
}
