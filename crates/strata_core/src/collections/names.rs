//! Names collection: one indexed store of named addresses per chain.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::collection::{Collection, CollectionPage, CrudOp, FacetId, decode_payload};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::facet::Facet;
use crate::item::{Filterable, Sortable};
use crate::page::SortSpec;
use crate::registry::StoreRegistry;
use crate::sdk::NamesSdk;
use crate::source::{ChannelSource, StreamContext, StreamSource};
use crate::store::{Store, StoreEnv, StoreKey};
use crate::types::Name;

pub const NAMES: &str = "names";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamesFacet {
    All,
    Custom,
    Prefund,
    Regular,
    Baddress,
}

impl FacetId for NamesFacet {
    const ALL: &'static [Self] = &[
        Self::All,
        Self::Custom,
        Self::Prefund,
        Self::Regular,
        Self::Baddress,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Custom => "custom",
            Self::Prefund => "prefund",
            Self::Regular => "regular",
            Self::Baddress => "baddress",
        }
    }
}

#[derive(Debug)]
pub struct NamesCollection {
    chain: String,
    sdk: Arc<dyn NamesSdk>,
    store: Arc<Store<Name>>,
    all: Facet<Name>,
    custom: Facet<Name>,
    prefund: Facet<Name>,
    regular: Facet<Name>,
    baddress: Facet<Name>,
}

impl NamesCollection {
    pub fn new(
        chain: &str,
        sdk: Arc<dyn NamesSdk>,
        stores: &StoreRegistry,
        env: &StoreEnv,
    ) -> Result<Self> {
        let key = StoreKey::new(NAMES, chain);
        let store = stores.get_or_create(key.clone(), || {
            Store::new(key, names_source(chain, &sdk, &env.config), env.clone())
                .with_dedup_key(Name::key)
                .with_index_key(Name::key)
        })?;

        let facet = |kind: NamesFacet| Facet::new(kind.as_str(), Arc::clone(&store));
        Ok(Self {
            chain: chain.to_string(),
            sdk,
            all: facet(NamesFacet::All),
            custom: facet(NamesFacet::Custom).with_predicate(|n: &Name| n.is_custom),
            prefund: facet(NamesFacet::Prefund).with_predicate(|n: &Name| n.is_prefund),
            regular: facet(NamesFacet::Regular).with_predicate(Name::is_regular),
            baddress: facet(NamesFacet::Baddress).with_predicate(Name::is_baddress),
            store,
        })
    }

    pub fn chain(&self) -> &str {
        &self.chain
    }

    pub fn facet(&self, kind: NamesFacet) -> &Facet<Name> {
        match kind {
            NamesFacet::All => &self.all,
            NamesFacet::Custom => &self.custom,
            NamesFacet::Prefund => &self.prefund,
            NamesFacet::Regular => &self.regular,
            NamesFacet::Baddress => &self.baddress,
        }
    }

    /// Point lookup by address, case-insensitive, valid mid-fetch
    pub fn get_name(&self, address: &str) -> Option<Name> {
        self.store.get_item_from_map(&address.to_lowercase())
    }

    /// Apply `op` upstream, then patch the cached row in place.
    ///
    /// Nothing is touched when the SDK rejects the change. When the store has
    /// not been loaded the patch is skipped; the next load reads fresh data.
    pub async fn apply(&self, op: CrudOp, name: &Name) -> Result<()> {
        let stored = match self.sdk.mutate_name(&self.chain, op, name).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(
                    "{}/{}: {} of {} failed: {}",
                    NAMES, self.chain, op, name.address, e
                );
                return Err(CacheError::crud_failed(NAMES, op.as_str(), e));
            }
        };

        let key = stored.key();
        let patched = match op {
            CrudOp::Create | CrudOp::Update => self.store.upsert(stored),
            CrudOp::Delete => self.store.update_by_key(&key, |n| n.deleted = true),
            CrudOp::Undelete => self.store.update_by_key(&key, |n| n.deleted = false),
            CrudOp::Remove => self.store.remove_by_key(&key).is_some(),
        };
        if !patched {
            debug!(
                "{}/{}: {} of {} not reflected in cache",
                NAMES, self.chain, op, key
            );
        }
        Ok(())
    }

    fn view(&self, facet: &str) -> Result<&Facet<Name>> {
        Ok(self.facet(NamesFacet::parse(NAMES, facet)?))
    }
}

#[async_trait]
impl Collection for NamesCollection {
    fn name(&self) -> &str {
        NAMES
    }

    fn facets(&self) -> Vec<String> {
        NamesFacet::names()
    }

    fn load_data(&self, facet: &str) -> Result<bool> {
        self.view(facet)?.load()
    }

    fn reset(&self, facet: &str) -> Result<()> {
        self.view(facet)?.reset();
        Ok(())
    }

    fn cancel(&self, facet: &str) -> Result<bool> {
        Ok(self.view(facet)?.cancel())
    }

    fn needs_update(&self, facet: &str) -> Result<bool> {
        Ok(self.view(facet)?.needs_update())
    }

    fn get_page(
        &self,
        facet: &str,
        first: i64,
        page_size: i64,
        sort_spec: &SortSpec,
        filter: &str,
    ) -> Result<CollectionPage> {
        self.view(facet)?
            .get_page(
                first,
                page_size,
                |name| name.matches_filter(filter),
                sort_spec,
                Name::sort_items,
            )
            .map(CollectionPage::Names)
    }

    async fn crud(&self, facet: &str, op: CrudOp, item: serde_json::Value) -> Result<()> {
        self.view(facet)?;
        let name: Name = decode_payload(NAMES, op, item)?;
        self.apply(op, &name).await
    }
}

fn names_source(
    chain: &str,
    sdk: &Arc<dyn NamesSdk>,
    config: &CacheConfig,
) -> Arc<dyn StreamSource<Name>> {
    let query_sdk = Arc::clone(sdk);
    let query_chain = chain.to_string();
    let count_sdk = Arc::clone(sdk);
    let count_chain = chain.to_string();

    let source = ChannelSource::passthrough(
        format!("list names ({chain})"),
        move |ctx: StreamContext<Name>| {
            let sdk = Arc::clone(&query_sdk);
            let chain = query_chain.clone();
            async move { sdk.list_names(&chain, ctx).await }
        },
    )
    .with_count(move || {
        let sdk = Arc::clone(&count_sdk);
        let chain = count_chain.clone();
        async move { sdk.count_names(&chain).await }
    })
    .with_capacity(config.channel_capacity);
    Arc::new(source)
}
