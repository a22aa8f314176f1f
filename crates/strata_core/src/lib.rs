//! Strata Core - shared streaming cache layer
//!
//! This crate sits between a blockchain-indexing SDK and a paginating UI
//! API. Each logical dataset is fetched by exactly one background stream,
//! partially-arrived data is served to filtered, sorted, paginated reads
//! while the stream is still running, and any number of views (facets) share
//! the same underlying store.

pub mod collection;
pub mod collections;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod facet;
pub mod item;
pub mod page;
pub mod registry;
pub mod sdk;
pub mod service;
pub mod source;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

pub use collection::{Collection, CollectionPage, CrudOp, FacetId};
pub use collections::{AbisCollection, AbisFacet, NamesCollection, NamesFacet};
pub use config::CacheConfig;
pub use context::ContextRegistry;
pub use error::{CacheError, ConfigError, Result, SourceError};
pub use event::{EventBus, ProgressEvent, StatusEvent, StoreEvent};
pub use facet::Facet;
pub use item::{Filterable, Sortable};
pub use page::{Page, SortOrder, SortSpec};
pub use registry::StoreRegistry;
pub use sdk::{AbisSdk, NamesSdk, SdkError};
pub use service::{CacheService, CacheServiceBuilder};
pub use source::{ChannelSource, StreamContext, StreamSource};
pub use store::{LoadState, Store, StoreEnv, StoreKey};
pub use types::{Abi, Function, FunctionKind, Name};
