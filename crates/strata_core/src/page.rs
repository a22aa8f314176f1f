//! Pages, sort specifications and pagination windows.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::store::LoadState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Ordered list of sort keys. `orders[i]` applies to `fields[i]`; a missing
/// order defaults to ascending.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub fields: Vec<String>,
    pub orders: Vec<SortOrder>,
}

impl SortSpec {
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        Self {
            fields: vec![field.into()],
            orders: vec![order],
        }
    }

    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        // Keep orders aligned with fields when earlier keys relied on the default
        self.orders.resize(self.fields.len(), SortOrder::Asc);
        self.fields.push(field.into());
        self.orders.push(order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// (field, order) pairs in priority order
    pub fn keys(&self) -> impl Iterator<Item = (&str, SortOrder)> {
        self.fields.iter().enumerate().map(|(i, field)| {
            (
                field.as_str(),
                self.orders.get(i).copied().unwrap_or_default(),
            )
        })
    }
}

/// Result of a paginated read. Built fresh for every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of items matching the filters, before the window was applied
    pub total_items: usize,
    pub expected_total: usize,
    pub is_fetching: bool,
    pub state: LoadState,
}

impl<T> Page<T> {
    pub fn empty(state: LoadState) -> Self {
        Self {
            items: Vec::new(),
            total_items: 0,
            expected_total: 0,
            is_fetching: state == LoadState::Loading,
            state,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Clamp the requested window `[first, first + page_size)` to `[0, len)`.
/// Negative or out-of-range requests yield an empty range.
pub fn window(first: i64, page_size: i64, len: usize) -> Range<usize> {
    if first < 0 || page_size <= 0 {
        return 0..0;
    }
    let Ok(start) = usize::try_from(first) else {
        return 0..0;
    };
    if start >= len {
        return 0..0;
    }
    let size = usize::try_from(page_size).unwrap_or(usize::MAX);
    start..start.saturating_add(size).min(len)
}

/// Keep only the window of `items`, consuming the vector.
pub(crate) fn paginate<T>(mut items: Vec<T>, first: i64, page_size: i64) -> Vec<T> {
    let range = window(first, page_size, items.len());
    items.truncate(range.end);
    items.drain(..range.start);
    items
}
