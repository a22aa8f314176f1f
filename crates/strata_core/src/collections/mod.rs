//! Built-in collections over the indexing SDK.

pub mod abis;
pub mod names;

pub use abis::{ABIS, AbisCollection, AbisFacet, FacetRef};
pub use names::{NAMES, NamesCollection, NamesFacet};
