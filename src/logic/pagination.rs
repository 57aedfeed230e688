use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

/// Page size used when a request gives none, or a non-positive one
pub const DEFAULT_LIMIT: usize = 25;

/// Identifies one result page; a client rebuilds the next page from
/// `limit` and `offset` alone. `offset` always sits on a page boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub page: usize,
    pub page_size: usize,
    pub limit: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
}

impl PageToken {
    pub fn with_order_by(mut self, order_by: Option<String>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn next(&self) -> Self {
        page(self.limit, self.offset.saturating_add(self.limit)).with_order_by(self.order_by.clone())
    }

    /// The preceding window, or `None` on the first one
    pub fn prev(&self) -> Option<Self> {
        (self.offset > 0).then(|| {
            page(self.limit, self.offset.saturating_sub(self.limit))
                .with_order_by(self.order_by.clone())
        })
    }

    pub fn query_string(&self) -> String {
        let mut query = format!("limit={}&offset={}", self.limit, self.offset);
        if let Some(order_by) = &self.order_by {
            query.push_str("&order_by=");
            query.extend(utf8_percent_encode(order_by, NON_ALPHANUMERIC));
        }
        query
    }
}

/// Apply the defaulting rules to raw request values
pub fn clamp(limit: i64, offset: i64) -> (usize, usize) {
    let limit = if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        usize::try_from(limit).unwrap_or(usize::MAX)
    };
    let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    (limit, offset)
}

/// Same rules for values that already passed through binding
pub fn clamp_window(limit: usize, offset: usize) -> (usize, usize) {
    clamp(
        i64::try_from(limit).unwrap_or(i64::MAX),
        i64::try_from(offset).unwrap_or(i64::MAX),
    )
}

/// Page token for a window. Pure function of `limit` and `offset`.
///
/// An offset that falls inside a page reports the page containing it, and
/// the token offset is snapped back to that page's first item.
pub fn page(limit: usize, offset: usize) -> PageToken {
    let (limit, offset) = clamp_window(limit, offset);
    let index = offset / limit;
    PageToken {
        page: index + 1,
        page_size: limit,
        limit,
        offset: index * limit,
        order_by: None,
    }
}

/// Cut the window `[offset, offset + limit)` out of `items` without ever
/// indexing past the end.
pub fn reslice<T>(mut items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }
    let end = offset.saturating_add(limit).min(items.len());
    items.truncate(end);
    items.drain(..offset);
    items
}
