//! ABIs collection.
//!
//! Two stores per chain: the ABI file list, and the flattened function and
//! event signatures across every ABI. `Downloaded` and `Known` split the list
//! store; `Functions` and `Events` split the detail store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::collection::{Collection, CollectionPage, CrudOp, FacetId, decode_payload};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::facet::Facet;
use crate::item::{Filterable, Sortable};
use crate::page::SortSpec;
use crate::registry::StoreRegistry;
use crate::sdk::AbisSdk;
use crate::source::{ChannelSource, StreamContext, StreamSource};
use crate::store::{Store, StoreEnv, StoreKey};
use crate::types::{Abi, Function, FunctionKind};

pub const ABIS: &str = "abis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbisFacet {
    Downloaded,
    Known,
    Functions,
    Events,
}

impl FacetId for AbisFacet {
    const ALL: &'static [Self] = &[Self::Downloaded, Self::Known, Self::Functions, Self::Events];

    fn as_str(&self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::Known => "known",
            Self::Functions => "functions",
            Self::Events => "events",
        }
    }
}

#[derive(Debug)]
pub struct AbisCollection {
    chain: String,
    sdk: Arc<dyn AbisSdk>,
    list: Arc<Store<Abi>>,
    detail: Arc<Store<Function>>,
    downloaded: Facet<Abi>,
    known: Facet<Abi>,
    functions: Facet<Function>,
    events: Facet<Function>,
}

impl AbisCollection {
    /// Build the collection for `chain`, reusing stores already registered for it.
    ///
    /// When the stores exist, their sources keep the SDK they were created with.
    pub fn new(
        chain: &str,
        sdk: Arc<dyn AbisSdk>,
        stores: &StoreRegistry,
        env: &StoreEnv,
    ) -> Result<Self> {
        let list_key = StoreKey::new(ABIS, chain);
        let list = stores.get_or_create(list_key.clone(), || {
            Store::new(list_key, list_source(chain, &sdk, &env.config), env.clone())
                .with_dedup_key(|abi: &Abi| abi.address.to_lowercase())
                .with_index_key(|abi: &Abi| abi.address.to_lowercase())
        })?;

        let detail_key = StoreKey::new(ABIS, format!("{chain}:details"));
        let detail = stores.get_or_create(detail_key.clone(), || {
            Store::new(detail_key, detail_source(chain, &sdk, &env.config), env.clone())
                .with_dedup_key(|function: &Function| function.encoding.clone())
        })?;

        let downloaded = Facet::new(AbisFacet::Downloaded.as_str(), Arc::clone(&list))
            .with_predicate(|abi: &Abi| !abi.is_known);
        let known = Facet::new(AbisFacet::Known.as_str(), Arc::clone(&list))
            .with_predicate(|abi: &Abi| abi.is_known);
        let functions = Facet::new(AbisFacet::Functions.as_str(), Arc::clone(&detail))
            .with_predicate(|f: &Function| f.kind == FunctionKind::Function)
            .with_dedupe_key(|f: &Function| f.encoding.clone());
        let events = Facet::new(AbisFacet::Events.as_str(), Arc::clone(&detail))
            .with_predicate(|f: &Function| f.kind == FunctionKind::Event)
            .with_dedupe_key(|f: &Function| f.encoding.clone());

        Ok(Self {
            chain: chain.to_string(),
            sdk,
            list,
            detail,
            downloaded,
            known,
            functions,
            events,
        })
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn facet(&self, kind: AbisFacet) -> FacetRef<'_> {
        match kind {
            AbisFacet::Downloaded => FacetRef::List(&self.downloaded),
            AbisFacet::Known => FacetRef::List(&self.known),
            AbisFacet::Functions => FacetRef::Detail(&self.functions),
            AbisFacet::Events => FacetRef::Detail(&self.events),
        }
    }

    /// Point lookup of an ABI summary by address, valid mid-fetch
    pub fn get_abi(&self, address: &str) -> Option<Abi> {
        self.list.get_item_from_map(&address.to_lowercase())
    }

    /// Delete the ABI for `address` upstream, then drop it from the cache.
    ///
    /// The detail store cannot tell which signatures came from this ABI, so it
    /// is reset and refetched on next use.
    pub async fn remove_abi(&self, address: &str) -> Result<()> {
        if let Err(e) = self.sdk.remove_abi(&self.chain, address).await {
            warn!("{}/{}: removing ABI {} failed: {}", ABIS, self.chain, address, e);
            return Err(CacheError::crud_failed(ABIS, CrudOp::Remove.as_str(), e));
        }

        if self.list.remove_by_key(&address.to_lowercase()).is_none() {
            debug!(
                "{}/{}: removed ABI {} was not cached",
                ABIS, self.chain, address
            );
        }
        self.detail.reset();
        info!("{}/{}: removed ABI {}", ABIS, self.chain, address);
        Ok(())
    }

    fn view(&self, facet: &str) -> Result<FacetRef<'_>> {
        Ok(self.facet(AbisFacet::parse(ABIS, facet)?))
    }
}

/// A facet of either store
#[derive(Debug, Clone, Copy)]
pub enum FacetRef<'a> {
    List(&'a Facet<Abi>),
    Detail(&'a Facet<Function>),
}

impl FacetRef<'_> {
    pub fn count(&self) -> usize {
        match self {
            Self::List(facet) => facet.count(),
            Self::Detail(facet) => facet.count(),
        }
    }

    pub fn expected_total(&self) -> usize {
        match self {
            Self::List(facet) => facet.expected_total(),
            Self::Detail(facet) => facet.expected_total(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            Self::List(facet) => facet.is_loaded(),
            Self::Detail(facet) => facet.is_loaded(),
        }
    }
}

#[async_trait]
impl Collection for AbisCollection {
    fn name(&self) -> &str {
        ABIS
    }

    fn facets(&self) -> Vec<String> {
        AbisFacet::names()
    }

    fn load_data(&self, facet: &str) -> Result<bool> {
        Ok(match self.view(facet)? {
            FacetRef::List(facet) => facet.load()?,
            FacetRef::Detail(facet) => facet.load()?,
        })
    }

    fn reset(&self, facet: &str) -> Result<()> {
        match self.view(facet)? {
            FacetRef::List(facet) => facet.reset(),
            FacetRef::Detail(facet) => facet.reset(),
        }
        Ok(())
    }

    fn cancel(&self, facet: &str) -> Result<bool> {
        Ok(match self.view(facet)? {
            FacetRef::List(facet) => facet.cancel(),
            FacetRef::Detail(facet) => facet.cancel(),
        })
    }

    fn needs_update(&self, facet: &str) -> Result<bool> {
        Ok(match self.view(facet)? {
            FacetRef::List(facet) => facet.needs_update(),
            FacetRef::Detail(facet) => facet.needs_update(),
        })
    }

    fn get_page(
        &self,
        facet: &str,
        first: i64,
        page_size: i64,
        sort_spec: &SortSpec,
        filter: &str,
    ) -> Result<CollectionPage> {
        match self.view(facet)? {
            FacetRef::List(facet) => facet
                .get_page(
                    first,
                    page_size,
                    |abi| abi.matches_filter(filter),
                    sort_spec,
                    Abi::sort_items,
                )
                .map(CollectionPage::Abis),
            FacetRef::Detail(facet) => facet
                .get_page(
                    first,
                    page_size,
                    |function| function.matches_filter(filter),
                    sort_spec,
                    Function::sort_items,
                )
                .map(CollectionPage::Functions),
        }
    }

    async fn crud(&self, facet: &str, op: CrudOp, item: serde_json::Value) -> Result<()> {
        let kind = AbisFacet::parse(ABIS, facet)?;
        let removable = matches!(kind, AbisFacet::Downloaded | AbisFacet::Known);
        if !removable || op != CrudOp::Remove {
            return Err(CacheError::unsupported(ABIS, kind.as_str(), op.as_str()));
        }
        let abi: Abi = decode_payload(ABIS, op, item)?;
        self.remove_abi(&abi.address).await
    }
}

/// Only selector-bearing entries are worth listing
fn keep_signature(function: Function) -> Option<Function> {
    let listed = matches!(function.kind, FunctionKind::Function | FunctionKind::Event);
    (listed && !function.encoding.is_empty()).then_some(function)
}

fn list_source(
    chain: &str,
    sdk: &Arc<dyn AbisSdk>,
    config: &CacheConfig,
) -> Arc<dyn StreamSource<Abi>> {
    let query_sdk = Arc::clone(sdk);
    let query_chain = chain.to_string();
    let count_sdk = Arc::clone(sdk);
    let count_chain = chain.to_string();

    let source = ChannelSource::passthrough(
        format!("list abis ({chain})"),
        move |ctx: StreamContext<Abi>| {
            let sdk = Arc::clone(&query_sdk);
            let chain = query_chain.clone();
            async move { sdk.list_abis(&chain, ctx).await }
        },
    )
    .with_count(move || {
        let sdk = Arc::clone(&count_sdk);
        let chain = count_chain.clone();
        async move { sdk.count_abis(&chain).await }
    })
    .with_capacity(config.channel_capacity);
    Arc::new(source)
}

fn detail_source(
    chain: &str,
    sdk: &Arc<dyn AbisSdk>,
    config: &CacheConfig,
) -> Arc<dyn StreamSource<Function>> {
    let sdk = Arc::clone(sdk);
    let query_chain = chain.to_string();

    let source = ChannelSource::new(
        format!("abi details ({chain})"),
        move |ctx: StreamContext<Function>| {
            let sdk = Arc::clone(&sdk);
            let chain = query_chain.clone();
            async move { sdk.abi_details(&chain, ctx).await }
        },
        keep_signature,
    )
    .with_capacity(config.channel_capacity);
    Arc::new(source)
}
