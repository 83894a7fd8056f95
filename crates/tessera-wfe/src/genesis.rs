//! The engine side of plugin callbacks.

use async_trait::async_trait;
use tessera_rpc::{Genesis, RpcError};
use tessera_value::{OrderedMap, Parameter, Type, Value};

use crate::activity::{Activity, ActivityBase, Resource};
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};

/// Service id under which callback-created resources are identified.
pub const GENESIS_SERVICE_ID: &str = "genesis";

/// Serves `GENESIS_RESOURCE` and `GENESIS_NOTICE` callbacks for one running
/// activity.
pub struct EngineGenesis {
    ctx: ActivityContext,
}

impl EngineGenesis {
    pub fn new(ctx: ActivityContext) -> Self {
        Self { ctx }
    }

    /// Reconcile the resource described by `request` and return its state.
    ///
    /// `type` names the resource type, `name` (defaulting to the type name)
    /// names the activity; every other key is a desired attribute.
    pub async fn resolve(&self, mut request: OrderedMap) -> Result<Value> {
        let type_name = match request.remove("type") {
            Some(Value::Str(name)) => name,
            _ => return Err(WfeError::bad_shape("resource request has no 'type'")),
        };
        let name = match request.remove("name") {
            Some(Value::Str(name)) => name,
            None => type_name.clone(),
            Some(other) => {
                return Err(WfeError::bad_shape(format!(
                    "resource request 'name' is {}, expected a string",
                    other.type_label()
                )));
            }
        };
        let resource_type = self
            .ctx
            .registry()
            .object_type(&type_name)
            .ok_or_else(|| WfeError::UnknownReference(type_name.clone()))?;

        let base = ActivityBase {
            name,
            service_id: GENESIS_SERVICE_ID.to_string(),
            input: request.keys().map(|k| Parameter::new(k, Type::Any)).collect(),
            output: resource_type
                .attributes
                .iter()
                .map(|a| Parameter::new(a.name.clone(), Type::Any))
                .collect(),
            when: None,
        };
        let resource = Resource::new(base, resource_type, None);
        tracing::debug!(activity = %resource.name(), "resolving callback resource");

        let output = resource.run(&self.ctx, request).await?;
        Ok(Value::Map(output))
    }
}

#[async_trait]
impl Genesis for EngineGenesis {
    async fn resource(&self, request: OrderedMap) -> tessera_rpc::Result<Value> {
        self.resolve(request).await.map_err(RpcError::callback)
    }

    async fn notice(&self, message: Value) -> tessera_rpc::Result<()> {
        tracing::info!(notice = %message, "plugin notice");
        Ok(())
    }
}
