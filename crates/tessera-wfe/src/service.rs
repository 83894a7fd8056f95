//! Services the engine talks to.

use async_trait::async_trait;
use tessera_rpc::{ActorsClient, Result, ServiceClient, ServiceMetadata};
use tessera_value::{OrderedMap, Value};

/// A loaded plugin service.
///
/// Actions, resource handlers and desired-state materialization all go
/// through this interface.
#[async_trait]
pub trait Service: Send + Sync {
    /// The service's types and definitions.
    async fn metadata(&self) -> Result<ServiceMetadata>;

    /// Invoke `method` on the object registered under `identifier`.
    async fn invoke(&self, identifier: &str, method: &str, arguments: Vec<Value>) -> Result<Value>;

    /// Materialize the desired state of the activity `name`.
    async fn state(&self, name: &str, input: OrderedMap) -> Result<Value>;
}

/// A service reached over a plugin transport.
#[derive(Clone)]
pub struct RemoteService {
    client: ServiceClient,
}

impl RemoteService {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Client for the plugin's `Actors` interface on the same connection.
    pub fn actors(&self) -> ActorsClient {
        self.client.actors()
    }
}

#[async_trait]
impl Service for RemoteService {
    async fn metadata(&self) -> Result<ServiceMetadata> {
        self.client.metadata().await
    }

    async fn invoke(&self, identifier: &str, method: &str, arguments: Vec<Value>) -> Result<Value> {
        tracing::debug!(identifier, method, "invoking remote method");
        self.client.invoke(identifier, method, arguments).await
    }

    async fn state(&self, name: &str, input: OrderedMap) -> Result<Value> {
        self.client.state(name, input).await
    }
}
