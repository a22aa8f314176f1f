//! Streaming sources: the seam between an external query and a store.
//!
//! An external query produces raw records asynchronously. It receives a
//! [`StreamContext`] holding an item channel, an error channel and a
//! cancellation token, and pushes into it until it is done, fails, or is told
//! to stop. [`ChannelSource`] multiplexes those channels, converts raw records
//! into store items and hands them to a caller-supplied handler.
//!
//! Sources never touch store state, which is what lets several facets share
//! one source through one store.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DEFAULT_CHANNEL_CAPACITY;
use crate::error::SourceError;

/// Handler invoked for every converted item. Returning `false` stops the fetch.
pub type ItemHandler<'a, T> = dyn FnMut(T) -> bool + Send + 'a;

/// Producer half handed to an external streaming query.
#[derive(Debug, Clone)]
pub struct StreamContext<R> {
    items: mpsc::Sender<R>,
    errors: mpsc::Sender<SourceError>,
    cancel: CancellationToken,
}

impl<R: Send> StreamContext<R> {
    pub fn new(
        items: mpsc::Sender<R>,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            items,
            errors,
            cancel,
        }
    }

    /// Push one raw item. Returns false once the consumer is gone or the
    /// context was cancelled; the query should stop producing then.
    pub async fn send(&self, item: R) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.items.send(item) => sent.is_ok(),
        }
    }

    /// Report a terminal failure on the error stream.
    pub async fn fail(&self, cause: impl Into<String>) {
        let error = SourceError::upstream(cause);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = self.errors.send(error) => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the consumer cancels this context.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// A streaming query adapted to a uniform item-producing contract.
#[async_trait]
pub trait StreamSource<T: Send + 'static>: Send + Sync + Debug {
    /// Human-readable name used in logs
    fn name(&self) -> &str;

    /// Best-effort item count from a cheap side query, if the upstream has one.
    async fn expected_count(&self) -> Option<usize> {
        None
    }

    /// Stream every item into `handler` until the query finishes, fails, the
    /// handler asks to stop, or `cancel` fires.
    ///
    /// Returns the first stream-reported error, [`SourceError::Cancelled`] when
    /// cancelled, or `Ok(())` on clean completion (including an early stop
    /// requested by the handler).
    async fn fetch(
        &self,
        cancel: CancellationToken,
        handler: &mut ItemHandler<'_, T>,
    ) -> Result<(), SourceError>;
}

type QueryFn<R> = Arc<dyn Fn(StreamContext<R>) -> BoxFuture<'static, ()> + Send + Sync>;
type ConvertFn<R, T> = Arc<dyn Fn(R) -> Option<T> + Send + Sync>;
type CountFn = Arc<dyn Fn() -> BoxFuture<'static, Option<usize>> + Send + Sync>;

/// [`StreamSource`] over a channel-producing query and a converter.
pub struct ChannelSource<R, T> {
    name: String,
    query: QueryFn<R>,
    convert: ConvertFn<R, T>,
    count: Option<CountFn>,
    capacity: usize,
}

impl<R, T> Debug for ChannelSource<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSource")
            .field("name", &self.name)
            .field("has_count", &self.count.is_some())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<R, T> ChannelSource<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    /// `convert` returning `None` drops the raw record.
    pub fn new<Q, Fut, C>(name: impl Into<String>, query: Q, convert: C) -> Self
    where
        Q: Fn(StreamContext<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        C: Fn(R) -> Option<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            query: Arc::new(move |ctx| query(ctx).boxed()),
            convert: Arc::new(convert),
            count: None,
            capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Attach the cheap count query used for progress display.
    pub fn with_count<F, Fut>(mut self, count: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<usize>> + Send + 'static,
    {
        self.count = Some(Arc::new(move || count().boxed()));
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl<T: Send + 'static> ChannelSource<T, T> {
    /// Source whose query already produces store items.
    pub fn passthrough<Q, Fut>(name: impl Into<String>, query: Q) -> Self
    where
        Q: Fn(StreamContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(name, query, Some)
    }
}

#[async_trait]
impl<R, T> StreamSource<T> for ChannelSource<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn expected_count(&self) -> Option<usize> {
        match &self.count {
            Some(count) => count().await,
            None => None,
        }
    }

    async fn fetch(
        &self,
        cancel: CancellationToken,
        handler: &mut ItemHandler<'_, T>,
    ) -> Result<(), SourceError> {
        let (item_tx, mut item_rx) = mpsc::channel(self.capacity);
        let (error_tx, mut error_rx) = mpsc::channel(self.capacity);
        let query_cancel = cancel.child_token();
        let ctx = StreamContext::new(item_tx, error_tx, query_cancel.clone());
        let query = tokio::spawn((self.query)(ctx));

        let mut items_open = true;
        let mut errors_open = true;
        let outcome = loop {
            if !items_open && !errors_open {
                break Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(SourceError::Cancelled),
                received = item_rx.recv(), if items_open => match received {
                    Some(raw) => {
                        if let Some(item) = (self.convert)(raw) {
                            if !handler(item) {
                                debug!("{}: handler stopped the stream early", self.name);
                                break Ok(());
                            }
                        }
                    }
                    None => items_open = false,
                },
                received = error_rx.recv(), if errors_open => match received {
                    Some(error) => break Err(error),
                    None => errors_open = false,
                },
            }
        };

        if !items_open && !errors_open {
            // Both streams closed: the query dropped its context, so it is done
            if let Err(join_error) = query.await {
                if join_error.is_panic() {
                    return Err(SourceError::Closed(format!(
                        "{} query panicked",
                        self.name
                    )));
                }
            }
        } else {
            query_cancel.cancel();
        }
        outcome
    }
}
