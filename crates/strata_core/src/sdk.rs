//! The indexing SDK as seen from the cache layer.
//!
//! Listing operations stream into a [`StreamContext`] and return once the
//! stream is exhausted, failed, or cancelled; failures are reported on the
//! context's error stream. Mutations are plain request/response calls.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::StreamContext;
use crate::types::{Abi, Function, Name};

/// Error returned by an SDK mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SdkError(pub String);

impl SdkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudOp {
    Create,
    Update,
    Delete,
    Undelete,
    Remove,
}

impl CrudOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Undelete => "undelete",
            Self::Remove => "remove",
        }
    }
}

impl std::fmt::Display for CrudOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait AbisSdk: Send + Sync + Debug {
    /// Stream the ABI summaries cached for `chain`
    async fn list_abis(&self, chain: &str, ctx: StreamContext<Abi>);

    /// Cheap count of the ABI summaries, if the backend can answer it
    async fn count_abis(&self, _chain: &str) -> Option<usize> {
        None
    }

    /// Stream every function and event signature across the cached ABIs
    async fn abi_details(&self, chain: &str, ctx: StreamContext<Function>);

    /// Delete the cached ABI file for `address`
    async fn remove_abi(&self, chain: &str, address: &str) -> Result<(), SdkError>;
}

#[async_trait]
pub trait NamesSdk: Send + Sync + Debug {
    /// Stream every name known for `chain`
    async fn list_names(&self, chain: &str, ctx: StreamContext<Name>);

    async fn count_names(&self, _chain: &str) -> Option<usize> {
        None
    }

    /// Apply `op` to `name` in the names database, returning the stored record
    async fn mutate_name(&self, chain: &str, op: CrudOp, name: &Name) -> Result<Name, SdkError>;
}
