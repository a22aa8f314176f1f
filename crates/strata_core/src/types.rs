//! Domain records cached by the built-in collections.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::item::{Filterable, Sortable, contains_ignore_case};

/// Summary of one ABI file known to the indexer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Abi {
    pub address: String,
    pub name: String,
    pub file_size: u64,
    pub n_functions: usize,
    pub n_events: usize,
    /// Shipped with the indexer rather than downloaded for a specific contract
    pub is_known: bool,
    pub is_empty: bool,
}

impl Filterable for Abi {
    fn matches_filter(&self, filter: &str) -> bool {
        contains_ignore_case(&self.name, filter) || contains_ignore_case(&self.address, filter)
    }
}

impl Sortable for Abi {
    const SORT_FIELDS: &'static [&'static str] =
        &["address", "name", "fileSize", "nFunctions", "nEvents"];

    fn compare_field(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "address" => self.address.cmp(&other.address),
            "name" => self.name.cmp(&other.name),
            "fileSize" => self.file_size.cmp(&other.file_size),
            "nFunctions" => self.n_functions.cmp(&other.n_functions),
            "nEvents" => self.n_events.cmp(&other.n_events),
            _ => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    #[default]
    Function,
    Event,
    Constructor,
    Fallback,
}

/// One decoded function or event signature from an ABI
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// Four-byte selector for functions, topic hash for events
    pub encoding: String,
    pub signature: String,
    pub kind: FunctionKind,
    #[serde(default)]
    pub state_mutability: String,
}

impl Function {
    pub fn is_event(&self) -> bool {
        self.kind == FunctionKind::Event
    }
}

impl Filterable for Function {
    fn matches_filter(&self, filter: &str) -> bool {
        contains_ignore_case(&self.name, filter)
            || contains_ignore_case(&self.encoding, filter)
            || contains_ignore_case(&self.signature, filter)
    }
}

impl Sortable for Function {
    const SORT_FIELDS: &'static [&'static str] = &["name", "encoding", "signature"];

    fn compare_field(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "name" => self.name.cmp(&other.name),
            "encoding" => self.encoding.cmp(&other.encoding),
            "signature" => self.signature.cmp(&other.signature),
            _ => Ordering::Equal,
        }
    }
}

/// A named address from the names database
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Name {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub decimals: u64,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub is_prefund: bool,
    #[serde(default)]
    pub is_contract: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl Name {
    /// Addresses compare case-insensitively
    pub fn key(&self) -> String {
        self.address.to_lowercase()
    }

    pub fn is_regular(&self) -> bool {
        !self.is_custom && !self.is_prefund
    }

    pub fn is_baddress(&self) -> bool {
        contains_ignore_case(&self.tags, "baddress")
    }
}

impl Filterable for Name {
    fn matches_filter(&self, filter: &str) -> bool {
        contains_ignore_case(&self.address, filter)
            || contains_ignore_case(&self.name, filter)
            || contains_ignore_case(&self.tags, filter)
            || contains_ignore_case(&self.symbol, filter)
            || contains_ignore_case(&self.source, filter)
    }
}

impl Sortable for Name {
    const SORT_FIELDS: &'static [&'static str] =
        &["address", "name", "tags", "source", "symbol", "decimals"];

    fn compare_field(&self, other: &Self, field: &str) -> Ordering {
        match field {
            "address" => self.key().cmp(&other.key()),
            "name" => self.name.cmp(&other.name),
            "tags" => self.tags.cmp(&other.tags),
            "source" => self.source.cmp(&other.source),
            "symbol" => self.symbol.cmp(&other.symbol),
            "decimals" => self.decimals.cmp(&other.decimals),
            _ => Ordering::Equal,
        }
    }
}
