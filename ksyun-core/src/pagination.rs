//! Pagination - Collect every page of a Describe/List call
//!
//! Ksyun list actions page in one of three ways: offset + limit, page
//! number + page size, or an opaque next token. The caller supplies the
//! request condition and a closure that performs one call and extracts the
//! items of that page.

use std::future::Future;

use crate::api::WireParams;
use crate::provider::{ProviderError, ProviderResult};

/// Page through a list action by offset or page number
///
/// With `start == 0` the `offset_param` is an item offset that grows by
/// `limit` per page. Otherwise it is a page number that starts at `start`
/// and grows by one. Paging stops at the first page shorter than `limit`.
pub async fn page_query<F, Fut>(
    condition: &WireParams,
    limit_param: &str,
    offset_param: &str,
    limit: usize,
    start: usize,
    mut call: F,
) -> ProviderResult<Vec<serde_json::Value>>
where
    F: FnMut(WireParams) -> Fut,
    Fut: Future<Output = ProviderResult<Vec<serde_json::Value>>>,
{
    if limit == 0 {
        return Err(ProviderError::new("Page size must be greater than zero"));
    }

    let mut results = Vec::new();
    let mut offset = start;
    loop {
        let mut params = condition.clone();
        params.insert(limit_param, limit as u64);
        params.insert(offset_param, offset as u64);

        let page = call(params).await?;
        let count = page.len();
        log::debug!(
            "page {}={} returned {} item(s)",
            offset_param,
            offset,
            count
        );
        results.extend(page);

        if count < limit {
            break;
        }
        offset = if start == 0 { offset + limit } else { offset + 1 };
    }
    Ok(results)
}

/// Page through a list action that returns a continuation token
///
/// `call` returns the items of one page and the token for the next one.
/// Paging stops on a short page or an empty token.
pub async fn page_query_with_next_token<F, Fut>(
    condition: &WireParams,
    limit_param: &str,
    token_param: &str,
    limit: usize,
    mut call: F,
) -> ProviderResult<Vec<serde_json::Value>>
where
    F: FnMut(WireParams) -> Fut,
    Fut: Future<Output = ProviderResult<(Vec<serde_json::Value>, Option<String>)>>,
{
    if limit == 0 {
        return Err(ProviderError::new("Page size must be greater than zero"));
    }

    let mut results = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut params = condition.clone();
        params.insert(limit_param, limit as u64);
        if let Some(token) = &token {
            params.insert(token_param, token.as_str());
        }

        let (page, next) = call(params).await?;
        let count = page.len();
        log::debug!("page token={:?} returned {} item(s)", token, count);
        results.extend(page);

        match next.filter(|t| !t.is_empty()) {
            Some(next) if count >= limit => token = Some(next),
            _ => break,
        }
    }
    Ok(results)
}
