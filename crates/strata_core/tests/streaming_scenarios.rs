//! End-to-end loading scenarios through CacheService and the ABIs collection.
//!
//! A scripted SDK releases list items one permit at a time so each test can
//! observe the cache mid-stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use strata_core::sdk::SdkError;
use strata_core::{
    Abi, AbisCollection, AbisSdk, CacheConfig, CacheError, CacheService, Collection, Function,
    LoadState, SortSpec, SourceError, StoreEvent, StreamContext,
};
use tokio::sync::Semaphore;
use tokio_test::{assert_err, assert_ok};

#[derive(Debug)]
struct ScriptedAbis {
    abis: Vec<Abi>,
    gate: Semaphore,
    failure: Option<String>,
    list_calls: AtomicUsize,
}

impl ScriptedAbis {
    fn new(count: usize) -> Self {
        let abis = (0..count)
            .map(|i| Abi {
                address: format!("0x{i:040x}"),
                name: format!("Contract{i}"),
                is_known: i % 3 == 0,
                ..Default::default()
            })
            .collect();
        Self {
            abis,
            gate: Semaphore::new(0),
            failure: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    fn calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AbisSdk for ScriptedAbis {
    async fn list_abis(&self, _chain: &str, ctx: StreamContext<Abi>) {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        for abi in &self.abis {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => return,
                permit = self.gate.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                },
            }
            if !ctx.send(abi.clone()).await {
                return;
            }
        }
        if let Some(message) = &self.failure {
            ctx.fail(message.clone()).await;
        }
    }

    async fn count_abis(&self, _chain: &str) -> Option<usize> {
        Some(self.abis.len())
    }

    async fn abi_details(&self, _chain: &str, _ctx: StreamContext<Function>) {}

    async fn remove_abi(&self, _chain: &str, _address: &str) -> Result<(), SdkError> {
        Ok(())
    }
}

fn setup(
    sdk: ScriptedAbis,
    config: CacheConfig,
) -> (CacheService, Arc<AbisCollection>, Arc<ScriptedAbis>) {
    let sdk = Arc::new(sdk);
    let service = CacheService::builder()
        .config(config)
        .abis_sdk(Arc::clone(&sdk) as Arc<dyn AbisSdk>)
        .build()
        .unwrap();
    let abis = service.abis("mainnet").unwrap();
    (service, abis, sdk)
}

async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn everything(abis: &AbisCollection) -> usize {
    ["downloaded", "known"]
        .iter()
        .map(|facet| {
            abis.get_page(facet, 0, 1000, &SortSpec::default(), "")
                .map(|page| page.total_items())
                .unwrap_or(0)
        })
        .sum()
}

#[tokio::test]
async fn test_partial_data_is_served_while_streaming() {
    let (_service, abis, sdk) = setup(ScriptedAbis::new(6), CacheConfig::default());

    assert!(assert_ok!(abis.load_data("downloaded")));
    sdk.release(3);
    wait_until(|| everything(&abis) == 3).await;

    let page = assert_ok!(abis.get_page("downloaded", 0, 10, &SortSpec::default(), ""));
    assert!(page.is_fetching());
    assert_eq!(page.state(), LoadState::Loading);
    assert_eq!(page.expected_total(), 6);
    // Contract0 is known; Contract1 and Contract2 are downloaded
    assert_eq!(page.total_items(), 2);

    sdk.release(3);
    wait_until(|| !abis.needs_update("known").unwrap()).await;
    assert_eq!(everything(&abis), 6);
    assert_eq!(sdk.calls(), 1);
}

#[tokio::test]
async fn test_failure_before_any_item_surfaces_on_read() {
    let (_service, abis, sdk) =
        setup(ScriptedAbis::new(0).failing("rpc unreachable"), CacheConfig::default());

    abis.load_data("known").unwrap();
    wait_until(|| {
        abis.get_page("known", 0, 10, &SortSpec::default(), "")
            .is_err()
    })
    .await;

    let err = assert_err!(abis.get_page("downloaded", 0, 10, &SortSpec::default(), ""));
    match &err {
        CacheError::FetchFailed { store, cause, .. } => {
            assert_eq!(store, "abis/mainnet");
            assert_eq!(cause, &SourceError::Upstream("rpc unreachable".to_string()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_validation());

    // A failed load leaves the store ready for a retry
    assert!(abis.needs_update("known").unwrap());
    assert!(abis.load_data("known").unwrap());
    wait_until(|| sdk.calls() == 2).await;
}

#[tokio::test]
async fn test_unread_failure_is_reported_by_the_next_load() {
    let (service, abis, sdk) =
        setup(ScriptedAbis::new(0).failing("rpc unreachable"), CacheConfig::default());
    let mut events = service.subscribe();

    assert!(assert_ok!(abis.load_data("known")));
    tokio::time::timeout(Duration::from_secs(5), async {
        while !matches!(events.recv().await, Ok(StoreEvent::Status(_))) {}
    })
    .await
    .expect("a status event for the failed load");

    // Nobody read the failure yet, so the load reports it instead of retrying
    let err = assert_err!(abis.load_data("downloaded"));
    assert_eq!(
        err.source_cause(),
        Some(&SourceError::Upstream("rpc unreachable".to_string()))
    );
    assert_eq!(sdk.calls(), 1);

    assert!(assert_ok!(abis.load_data("downloaded")));
    wait_until(|| sdk.calls() == 2).await;
}

#[tokio::test]
async fn test_partial_failure_keeps_data_and_reports_status() {
    let (service, abis, sdk) =
        setup(ScriptedAbis::new(2).failing("connection reset"), CacheConfig::default());
    let mut events = service.subscribe();

    abis.load_data("downloaded").unwrap();
    sdk.release(2);
    wait_until(|| !abis.needs_update("downloaded").unwrap()).await;

    assert_eq!(everything(&abis), 2);

    let mut status = None;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::Status(event) = event {
            status = Some(event);
        }
    }
    let status = status.expect("a status event for the partial load");
    assert_eq!(status.category, "abis");
    assert_eq!(status.facet, "downloaded");
    assert!(status.message.contains("connection reset"));
}

#[tokio::test]
async fn test_cancel_keeps_committed_items() {
    let (_service, abis, sdk) = setup(ScriptedAbis::new(10), CacheConfig::default());

    abis.load_data("downloaded").unwrap();
    sdk.release(5);
    wait_until(|| everything(&abis) == 5).await;

    assert!(abis.cancel("known").unwrap());
    wait_until(|| !abis.needs_update("downloaded").unwrap()).await;

    assert_eq!(everything(&abis), 5);
    assert!(!abis.cancel("known").unwrap());
    assert!(!abis.load_data("downloaded").unwrap());
}

#[tokio::test]
async fn test_reset_while_loading_restarts_cleanly() {
    let (_service, abis, sdk) = setup(ScriptedAbis::new(3), CacheConfig::default());

    abis.load_data("downloaded").unwrap();
    sdk.release(1);
    wait_until(|| everything(&abis) == 1).await;

    abis.reset("known").unwrap();
    assert_eq!(everything(&abis), 0);
    assert!(abis.needs_update("downloaded").unwrap());

    assert!(abis.load_data("downloaded").unwrap());
    sdk.release(3);
    wait_until(|| !abis.needs_update("downloaded").unwrap()).await;
    assert_eq!(everything(&abis), 3);
    assert_eq!(sdk.calls(), 2);
}

#[tokio::test]
async fn test_progress_events_track_the_load() {
    let (service, abis, sdk) = setup(
        ScriptedAbis::new(3),
        CacheConfig::default().with_refresh_every(1),
    );
    let mut events = service.subscribe();

    abis.load_data("downloaded").unwrap();
    sdk.release(3);
    wait_until(|| !abis.needs_update("downloaded").unwrap()).await;

    let mut progress = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let Some(event) = event.as_progress() {
            progress.push(event.clone());
        }
    }
    assert!(!progress.is_empty());
    assert!(progress.iter().all(|p| p.category == "abis" && p.facet == "downloaded"));
    assert!(progress.windows(2).all(|w| w[0].current <= w[1].current));

    let last = progress.last().unwrap();
    assert!(last.is_loaded);
    assert_eq!(last.current, 3);
    assert_eq!(last.expected, 3);
}

#[tokio::test]
async fn test_out_of_range_pages_are_empty_not_errors() {
    let (_service, abis, sdk) = setup(ScriptedAbis::new(2), CacheConfig::default());
    abis.load_data("known").unwrap();
    sdk.release(2);
    wait_until(|| !abis.needs_update("known").unwrap()).await;

    for (first, size) in [(1_000_000, 10), (-5, 10), (0, 0), (0, -1)] {
        let page = assert_ok!(abis.get_page("downloaded", first, size, &SortSpec::default(), ""));
        assert!(page.is_empty());
        assert_eq!(page.total_items(), 1);
    }
}
