//! The uniform surface every cached collection exposes to the API layer.
//!
//! A collection groups one or more stores behind named facets. Facet ids
//! arrive as strings from the views and are parsed into the collection's own
//! facet enum before anything else happens.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{CacheError, Result};
use crate::page::{Page, SortSpec};
use crate::store::LoadState;
use crate::types::{Abi, Function, Name};

pub use crate::sdk::CrudOp;

/// A collection's closed set of facets
pub trait FacetId: Copy + Eq + Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    fn as_str(&self) -> &'static str;

    fn names() -> Vec<String> {
        Self::ALL.iter().map(|f| f.as_str().to_string()).collect()
    }

    /// Case-insensitive lookup by id
    fn parse(collection: &str, id: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(id))
            .ok_or_else(|| CacheError::unknown_facet(collection, id, Self::names()))
    }
}

/// A page of whichever item type the facet serves
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "page", rename_all = "snake_case")]
pub enum CollectionPage {
    Abis(Page<Abi>),
    Functions(Page<Function>),
    Names(Page<Name>),
}

impl CollectionPage {
    pub fn total_items(&self) -> usize {
        match self {
            Self::Abis(page) => page.total_items,
            Self::Functions(page) => page.total_items,
            Self::Names(page) => page.total_items,
        }
    }

    pub fn expected_total(&self) -> usize {
        match self {
            Self::Abis(page) => page.expected_total,
            Self::Functions(page) => page.expected_total,
            Self::Names(page) => page.expected_total,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.state() == LoadState::Loading
    }

    pub fn state(&self) -> LoadState {
        match self {
            Self::Abis(page) => page.state,
            Self::Functions(page) => page.state,
            Self::Names(page) => page.state,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Abis(page) => page.len(),
            Self::Functions(page) => page.len(),
            Self::Names(page) => page.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_abis(self) -> Option<Page<Abi>> {
        match self {
            Self::Abis(page) => Some(page),
            _ => None,
        }
    }

    pub fn into_functions(self) -> Option<Page<Function>> {
        match self {
            Self::Functions(page) => Some(page),
            _ => None,
        }
    }

    pub fn into_names(self) -> Option<Page<Name>> {
        match self {
            Self::Names(page) => Some(page),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Collection: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Facet ids this collection accepts
    fn facets(&self) -> Vec<String>;

    /// Start loading the store behind `facet`. Returns true when a new fetch
    /// was started, false when one is running or the data is already loaded.
    ///
    /// A previous fetch that failed with no data, and was never reported by a
    /// read, comes back here as `FetchFailed`; calling again retries.
    fn load_data(&self, facet: &str) -> Result<bool>;

    /// Drop the cached data behind `facet`, cancelling any in-flight fetch.
    fn reset(&self, facet: &str) -> Result<()>;

    /// Stop the fetch behind `facet`, keeping what already arrived.
    fn cancel(&self, facet: &str) -> Result<bool>;

    fn needs_update(&self, facet: &str) -> Result<bool>;

    fn get_page(
        &self,
        facet: &str,
        first: i64,
        page_size: i64,
        sort_spec: &SortSpec,
        filter: &str,
    ) -> Result<CollectionPage>;

    /// Apply `op` to `item` through the SDK, then patch the cached data.
    /// `item` is the JSON record sent by the view.
    async fn crud(&self, facet: &str, op: CrudOp, item: serde_json::Value) -> Result<()>;
}

/// Decode a view-supplied record for a CRUD call
pub fn decode_payload<T: DeserializeOwned>(
    collection: &str,
    op: CrudOp,
    item: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(item)
        .map_err(|e| CacheError::invalid_payload(collection, op.as_str(), e))
}
