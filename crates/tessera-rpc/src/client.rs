//! Clients for the `Actors` and `Service` plugin interfaces.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::json;
use tessera_value::{OrderedMap, Value};

use crate::error::{Result, RpcError};
use crate::genesis::Genesis;
use crate::protocol::{
    ActorDefinition, GENESIS_NOTICE, GENESIS_RESOURCE, GetActorParams, INVOKE_ACTION, InvokeParams,
    Message, ServiceMetadata, StateParams, methods,
};
use crate::stream::ActionStream;
use crate::transport::Transport;

/// Client for a plugin's `Actors` service.
#[derive(Clone)]
pub struct ActorsClient {
    transport: Arc<dyn Transport>,
}

impl ActorsClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetch the static definition of an actor.
    pub async fn get_actor(&self, name: &str) -> Result<ActorDefinition> {
        let params = serde_json::to_value(GetActorParams {
            name: name.to_string(),
        })?;
        let result = self.transport.call(methods::GET_ACTOR, params).await?;
        decode(result, "actor definition")
    }

    /// Invoke an action, serving callbacks through `genesis` until the final
    /// response arrives.
    pub async fn invoke_action(&self, args: Value, genesis: &dyn Genesis) -> Result<Value> {
        let mut stream = self.transport.open_stream(methods::INVOKE_ACTION).await?;
        invoke_on_stream(stream.as_mut(), args, genesis).await
    }
}

/// Drive one `InvokeAction` exchange over an already open stream.
///
/// Inbound messages are handled strictly one at a time: a resource callback
/// is answered before the next message is read. The stream is closed on any
/// failure.
pub async fn invoke_on_stream(
    stream: &mut dyn ActionStream,
    args: Value,
    genesis: &dyn Genesis,
) -> Result<Value> {
    match exchange(stream, args, genesis).await {
        Ok(value) => {
            stream.close_send().await?;
            Ok(value)
        }
        Err(e) => {
            stream.close().await;
            Err(e)
        }
    }
}

async fn exchange(stream: &mut dyn ActionStream, args: Value, genesis: &dyn Genesis) -> Result<Value> {
    stream.send(Message::new(INVOKE_ACTION, args)).await?;

    loop {
        let Some(message) = stream.recv().await? else {
            tracing::debug!("stream ended before final response");
            return Err(RpcError::StreamClosed);
        };

        match message.id {
            INVOKE_ACTION => return Ok(message.value),
            GENESIS_RESOURCE => {
                tracing::debug!("resource callback");
                let request = message
                    .value
                    .into_map()
                    .ok_or_else(|| RpcError::bad_shape("resource callback must carry a map"))?;
                let resolved = genesis.resource(request).await?;
                stream.send(Message::new(GENESIS_RESOURCE, resolved)).await?;
            }
            GENESIS_NOTICE => {
                genesis.notice(message.value).await?;
            }
            other => {
                tracing::warn!(id = other, "unexpected message id on action stream");
                return Err(RpcError::UnexpectedMessageId(other));
            }
        }
    }
}

/// Client for a plugin's `Service` interface.
#[derive(Clone)]
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
}

impl ServiceClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// An `Actors` client sharing this connection.
    pub fn actors(&self) -> ActorsClient {
        ActorsClient::new(self.transport.clone())
    }

    pub async fn metadata(&self) -> Result<ServiceMetadata> {
        let result = self.transport.call(methods::METADATA, json!({})).await?;
        decode(result, "service metadata")
    }

    /// Invoke `method` on the object registered under `identifier`.
    pub async fn invoke(&self, identifier: &str, method: &str, arguments: Vec<Value>) -> Result<Value> {
        let params = serde_json::to_value(InvokeParams {
            identifier: identifier.to_string(),
            method: method.to_string(),
            arguments,
        })?;
        let result = self.transport.call(methods::INVOKE, params).await?;
        decode(result, "invoke result")
    }

    /// Materialize the desired state of activity `name` from its input.
    pub async fn state(&self, name: &str, input: OrderedMap) -> Result<Value> {
        let params = serde_json::to_value(StateParams {
            name: name.to_string(),
            input,
        })?;
        let result = self.transport.call(methods::STATE, params).await?;
        decode(result, "state result")
    }
}

fn decode<T: DeserializeOwned>(result: serde_json::Value, what: &str) -> Result<T> {
    serde_json::from_value(result).map_err(|e| RpcError::bad_shape(format!("{what}: {e}")))
}
