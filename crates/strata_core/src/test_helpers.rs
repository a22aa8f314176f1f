#![cfg(test)]

pub mod fakes {
    use std::cmp::Ordering;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use crate::item::Sortable;
    use crate::source::{ChannelSource, StreamContext, StreamSource};

    /// Minimal function-or-event signature used by store and facet tests
    #[derive(Debug, Clone, PartialEq)]
    pub struct Sig {
        pub name: String,
        pub encoding: String,
        pub is_event: bool,
    }

    impl Sig {
        pub fn function(name: &str, encoding: &str) -> Self {
            Self {
                name: name.to_string(),
                encoding: encoding.to_string(),
                is_event: false,
            }
        }

        pub fn event(name: &str, encoding: &str) -> Self {
            Self {
                is_event: true,
                ..Self::function(name, encoding)
            }
        }
    }

    impl Sortable for Sig {
        const SORT_FIELDS: &'static [&'static str] = &["name", "encoding"];

        fn compare_field(&self, other: &Self, field: &str) -> Ordering {
            match field {
                "name" => self.name.cmp(&other.name),
                "encoding" => self.encoding.cmp(&other.encoding),
                _ => Ordering::Equal,
            }
        }
    }

    /// Scripted stream: yields `items` in order, optionally one permit at a
    /// time, then optionally reports a failure.
    #[derive(Debug, Clone)]
    pub struct FakeStream<T> {
        items: Vec<T>,
        gated: bool,
        failure: Option<String>,
        expected: Option<usize>,
        count_delay: Duration,
    }

    /// Test-side control over a [`FakeStream`] turned into a source
    #[derive(Debug, Clone)]
    pub struct FakeHandle {
        gate: Option<Arc<Semaphore>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeHandle {
        /// Let `n` more items through a gated stream. No-op when ungated.
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        /// How many times the query was started
        pub fn calls(&self) -> usize {
            self.calls.load(AtomicOrdering::SeqCst)
        }
    }

    impl<T: Clone + Send + Sync + 'static> FakeStream<T> {
        pub fn new(items: Vec<T>) -> Self {
            Self {
                items,
                gated: false,
                failure: None,
                expected: None,
                count_delay: Duration::ZERO,
            }
        }

        /// Hold every item until the handle releases it
        pub fn gated(mut self) -> Self {
            self.gated = true;
            self
        }

        /// Report `message` on the error stream after the last item
        pub fn fail_with(mut self, message: &str) -> Self {
            self.failure = Some(message.to_string());
            self
        }

        pub fn expected(mut self, count: usize) -> Self {
            self.expected = Some(count);
            self
        }

        /// Like [`expected`](Self::expected), but the count resolves after `delay`
        pub fn expected_after(mut self, count: usize, delay: Duration) -> Self {
            self.count_delay = delay;
            self.expected(count)
        }

        pub fn into_source(self, name: &str) -> (Arc<dyn StreamSource<T>>, FakeHandle) {
            let gate = Arc::new(Semaphore::new(0));
            let calls = Arc::new(AtomicUsize::new(0));
            let handle = FakeHandle {
                gate: self.gated.then(|| Arc::clone(&gate)),
                calls: Arc::clone(&calls),
            };

            let items = Arc::new(self.items);
            let gated = self.gated;
            let failure = self.failure;
            let mut source = ChannelSource::passthrough(name, move |ctx: StreamContext<T>| {
                calls.fetch_add(1, AtomicOrdering::SeqCst);
                let items = Arc::clone(&items);
                let gate = Arc::clone(&gate);
                let failure = failure.clone();
                async move {
                    for item in items.iter() {
                        if gated {
                            tokio::select! {
                                biased;
                                _ = ctx.cancelled() => return,
                                permit = gate.acquire() => match permit {
                                    Ok(permit) => permit.forget(),
                                    Err(_) => return,
                                },
                            }
                        }
                        if !ctx.send(item.clone()).await {
                            return;
                        }
                    }
                    if let Some(message) = failure {
                        ctx.fail(message).await;
                    }
                }
            });
            if let Some(expected) = self.expected {
                let delay = self.count_delay;
                source = source.with_count(move || async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Some(expected)
                });
            }
            (Arc::new(source), handle)
        }
    }

    /// Poll `condition` until it holds, panicking after five seconds.
    pub async fn wait_until(condition: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not met within 5s");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

pub mod sdk {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::sdk::{AbisSdk, CrudOp, NamesSdk, SdkError};
    use crate::source::StreamContext;
    use crate::types::{Abi, Function, FunctionKind, Name};

    pub fn abi(address: &str, name: &str, is_known: bool) -> Abi {
        Abi {
            address: address.to_string(),
            name: name.to_string(),
            is_known,
            ..Default::default()
        }
    }

    pub fn function(name: &str, encoding: &str, kind: FunctionKind) -> Function {
        Function {
            name: name.to_string(),
            encoding: encoding.to_string(),
            signature: format!("{name}()"),
            kind,
            ..Default::default()
        }
    }

    pub fn name(address: &str, label: &str) -> Name {
        Name {
            address: address.to_string(),
            name: label.to_string(),
            ..Default::default()
        }
    }

    /// In-memory ABI backend
    #[derive(Debug, Default)]
    pub struct FakeAbisSdk {
        pub abis: Vec<Abi>,
        pub functions: Vec<Function>,
        pub remove_error: Option<String>,
        pub removed: Mutex<Vec<String>>,
        pub list_calls: AtomicUsize,
        pub detail_calls: AtomicUsize,
    }

    impl FakeAbisSdk {
        pub fn new(abis: Vec<Abi>, functions: Vec<Function>) -> Self {
            Self {
                abis,
                functions,
                ..Default::default()
            }
        }

        pub fn failing_removes(mut self, message: &str) -> Self {
            self.remove_error = Some(message.to_string());
            self
        }
    }

    #[async_trait]
    impl AbisSdk for FakeAbisSdk {
        async fn list_abis(&self, _chain: &str, ctx: StreamContext<Abi>) {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            for abi in &self.abis {
                if !ctx.send(abi.clone()).await {
                    return;
                }
            }
        }

        async fn count_abis(&self, _chain: &str) -> Option<usize> {
            Some(self.abis.len())
        }

        async fn abi_details(&self, _chain: &str, ctx: StreamContext<Function>) {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            for function in &self.functions {
                if !ctx.send(function.clone()).await {
                    return;
                }
            }
        }

        async fn remove_abi(&self, _chain: &str, address: &str) -> Result<(), SdkError> {
            if let Some(message) = &self.remove_error {
                return Err(SdkError::new(message.clone()));
            }
            self.removed.lock().push(address.to_string());
            Ok(())
        }
    }

    /// In-memory names backend that echoes mutations back
    #[derive(Debug, Default)]
    pub struct FakeNamesSdk {
        pub names: Vec<Name>,
        pub mutate_error: Option<String>,
        pub mutations: Mutex<Vec<(CrudOp, String)>>,
    }

    impl FakeNamesSdk {
        pub fn new(names: Vec<Name>) -> Self {
            Self {
                names,
                ..Default::default()
            }
        }

        pub fn failing_mutations(mut self, message: &str) -> Self {
            self.mutate_error = Some(message.to_string());
            self
        }
    }

    #[async_trait]
    impl NamesSdk for FakeNamesSdk {
        async fn list_names(&self, _chain: &str, ctx: StreamContext<Name>) {
            for name in &self.names {
                if !ctx.send(name.clone()).await {
                    return;
                }
            }
        }

        async fn count_names(&self, _chain: &str) -> Option<usize> {
            Some(self.names.len())
        }

        async fn mutate_name(
            &self,
            _chain: &str,
            op: CrudOp,
            name: &Name,
        ) -> Result<Name, SdkError> {
            if let Some(message) = &self.mutate_error {
                return Err(SdkError::new(message.clone()));
            }
            self.mutations.lock().push((op, name.address.clone()));
            let mut stored = name.clone();
            match op {
                CrudOp::Create | CrudOp::Update => stored.is_custom = true,
                CrudOp::Delete => stored.deleted = true,
                CrudOp::Undelete => stored.deleted = false,
                CrudOp::Remove => {}
            }
            Ok(stored)
        }
    }
}
