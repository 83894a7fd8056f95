//! Per-invocation activity context.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_value::OrderedMap;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{Result, WfeError};
use crate::identity::IdentityStore;
use crate::operation::Operation;
use crate::registry::Registry;

/// Everything an activity can reach while it runs.
///
/// Cloning is cheap; clones share the registry, identity store,
/// cancellation token and dataflow.
#[derive(Clone)]
pub struct ActivityContext {
    operation: Operation,
    registry: Arc<Registry>,
    identity: Arc<IdentityStore>,
    config: Arc<EngineConfig>,
    cancel: CancellationToken,
    dataflow: Arc<RwLock<OrderedMap>>,
}

impl ActivityContext {
    pub fn new(registry: Arc<Registry>, identity: Arc<IdentityStore>, config: EngineConfig) -> Self {
        Self {
            operation: Operation::default(),
            registry,
            identity,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            dataflow: Arc::new(RwLock::new(OrderedMap::new())),
        }
    }

    /// Build a context whose identity store follows `config.identity_db`.
    pub fn open(registry: Arc<Registry>, config: EngineConfig) -> Result<Self> {
        let identity = match &config.identity_db {
            Some(path) => IdentityStore::open(path)?,
            None => IdentityStore::in_memory(),
        };
        Ok(Self::new(registry, Arc::new(identity), config))
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A context sharing everything but the dataflow, which starts as `seed`.
    pub fn scoped(&self, seed: OrderedMap) -> Self {
        Self {
            dataflow: Arc::new(RwLock::new(seed)),
            ..self.clone()
        }
    }

    /// Snapshot of the dataflow.
    pub fn dataflow(&self) -> OrderedMap {
        self.dataflow.read().clone()
    }

    /// Merge an activity's output into the dataflow.
    pub fn publish(&self, output: OrderedMap) {
        self.dataflow.write().merge(output);
    }

    /// Race `fut` against cancellation.
    pub async fn cancellable<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WfeError::Cancelled),
            result = fut => result,
        }
    }

    /// Race `fut` against cancellation and the configured activity timeout.
    pub async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.activity_timeout() {
            Some(limit) => {
                self.cancellable(async {
                    tokio::time::timeout(limit, fut)
                        .await
                        .map_err(|_| WfeError::Timeout)?
                })
                .await
            }
            None => self.cancellable(fut).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tessera_value::Value;

    fn context(config: EngineConfig) -> ActivityContext {
        ActivityContext::new(
            Arc::new(Registry::new()),
            Arc::new(IdentityStore::in_memory()),
            config.without_identity_db(),
        )
    }

    #[test]
    fn test_scoped_dataflow_is_separate() {
        let ctx = context(EngineConfig::default());
        ctx.publish(OrderedMap::from([("a", Value::from(1))]));

        let inner = ctx.scoped(OrderedMap::from([("b", Value::from(2))]));
        inner.publish(OrderedMap::from([("c", Value::from(3))]));

        assert_eq!(ctx.dataflow().len(), 1);
        assert_eq!(inner.dataflow().keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_guard_cancelled() {
        let ctx = context(EngineConfig::default());
        ctx.cancellation().cancel();
        let err = ctx
            .guard(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, WfeError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_timeout() {
        let ctx = context(EngineConfig::default().with_activity_timeout(Duration::from_secs(2)));
        let err = ctx
            .guard(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WfeError::Timeout));

        let ok = ctx.guard(async { Ok(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn test_open_in_memory() {
        let ctx = ActivityContext::open(
            Arc::new(Registry::new()),
            EngineConfig::default().without_identity_db(),
        )
        .unwrap()
        .with_operation(Operation::Delete);
        assert_eq!(ctx.operation(), Operation::Delete);
        assert!(ctx.identity().records().unwrap().is_empty());
    }
}
