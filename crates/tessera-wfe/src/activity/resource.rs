use std::sync::Arc;

use async_trait::async_trait;
use tessera_rpc::{Definition, Style};
use tessera_value::{ObjectType, OrderedMap, Parameter, TypedObject, Value};

use super::{Activity, ActivityBase, activity_identifier, project_input, project_object};
use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};
use crate::operation::Operation;
use crate::registry::Registry;
use crate::service::Service;

const CREATE: &str = "create";
const READ: &str = "read";
const UPDATE: &str = "update";
const DELETE: &str = "delete";

/// An activity that converges an external object onto its desired state
/// through the handler registered for its type.
#[derive(Debug, Clone)]
pub struct Resource {
    base: ActivityBase,
    resource_type: ObjectType,
    external_id: Option<String>,
}

/// The resolved handler of a resource type.
struct Handler {
    name: String,
    service: Arc<dyn Service>,
    supports_update: bool,
}

impl Resource {
    pub fn from_definition(def: &Definition, registry: &Registry) -> Result<Self> {
        let type_name = def
            .resource_type
            .as_deref()
            .ok_or_else(|| WfeError::bad_shape(format!("resource '{}' has no resource_type", def.name)))?;
        let resource_type = registry
            .object_type(type_name)
            .ok_or_else(|| WfeError::UnknownReference(type_name.to_string()))?;
        Ok(Self::new(
            ActivityBase::from_definition(def)?,
            resource_type,
            def.external_id.clone(),
        ))
    }

    pub(crate) fn new(base: ActivityBase, resource_type: ObjectType, external_id: Option<String>) -> Self {
        Self {
            base,
            resource_type,
            external_id,
        }
    }

    pub fn resource_type(&self) -> &ObjectType {
        &self.resource_type
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    fn handler(&self, ctx: &ActivityContext) -> Result<Handler> {
        let type_name = &self.resource_type.name;
        let def = ctx
            .registry()
            .handler(type_name)
            .ok_or_else(|| WfeError::UnknownReference(format!("Handler/{type_name}")))?;
        let service = ctx
            .registry()
            .service(&def.service_id)
            .ok_or_else(|| WfeError::UnknownReference(format!("Service/{}", def.service_id)))?;
        let supports_update = def.interface.as_ref().is_some_and(|i| i.has_member(UPDATE));
        Ok(Handler {
            name: def.name,
            service,
            supports_update,
        })
    }

    async fn call(&self, handler: &Handler, method: &str, arguments: Vec<Value>) -> Result<Value> {
        handler
            .service
            .invoke(&handler.name, method, arguments)
            .await
            .map_err(|e| WfeError::handler_failure(&handler.name, method, e))
    }

    /// Assert a handler result is an instance of the resource type.
    fn conform(&self, method: &str, value: &Value) -> Result<TypedObject> {
        self.resource_type
            .assert_instance(&self.label(), value)
            .map_err(|e| WfeError::bad_shape(format!("{} {method}: {e}", self.label())))
    }

    async fn read(&self, handler: &Handler, ext_id: &str) -> Result<TypedObject> {
        let value = self.call(handler, READ, vec![Value::from(ext_id)]).await?;
        self.conform(READ, &value)
    }

    async fn create(&self, ctx: &ActivityContext, handler: &Handler, desired: &TypedObject) -> Result<TypedObject> {
        let value = self
            .call(handler, CREATE, vec![Value::Object(desired.clone())])
            .await?;
        let (object, ext_id) = match value {
            Value::List(items) if items.len() == 2 => match &items[1] {
                // scalar ids are recorded in their string form
                Value::Str(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_) => {
                    (self.conform(CREATE, &items[0])?, items[1].to_string())
                }
                other => {
                    return Err(WfeError::bad_shape(format!(
                        "{} create: external id is {}, expected a scalar",
                        self.label(),
                        other.type_label()
                    )));
                }
            },
            other => {
                return Err(WfeError::bad_shape(format!(
                    "{} create returned {}, expected [object, external id]",
                    self.label(),
                    other.type_label()
                )));
            }
        };
        ctx.identity().associate(&self.identifier(), &ext_id)?;
        tracing::info!(activity = %self.base.name, external_id = %ext_id, "created resource");
        Ok(object)
    }

    async fn update(&self, handler: &Handler, ext_id: &str, desired: &TypedObject) -> Result<TypedObject> {
        let value = self
            .call(handler, UPDATE, vec![Value::from(ext_id), Value::Object(desired.clone())])
            .await?;
        tracing::info!(activity = %self.base.name, external_id = %ext_id, "updated resource");
        self.conform(UPDATE, &value)
    }

    async fn delete(&self, ctx: &ActivityContext, handler: &Handler, ext_id: &str) -> Result<()> {
        self.call(handler, DELETE, vec![Value::from(ext_id)]).await?;
        ctx.identity().remove_external(ext_id)?;
        tracing::info!(activity = %self.base.name, external_id = %ext_id, "deleted resource");
        Ok(())
    }

    /// Desired state from the defining service, or built locally when no
    /// such service is registered. Provided attributes are never included.
    async fn desired_state(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<TypedObject> {
        let Some(service) = ctx.registry().service(&self.base.service_id) else {
            return Ok(self.resource_type.new_instance(&input)?);
        };
        let attributes = match service.state(&self.base.name, input).await? {
            Value::Map(map) => map,
            Value::Object(object) if object.type_name == self.resource_type.name => object.attributes,
            other => {
                let actual = match &other {
                    Value::Object(object) => object.type_name.clone(),
                    v => v.type_label().to_string(),
                };
                return Err(WfeError::bad_shape(format!(
                    "{} state is {actual}, expected {}",
                    self.label(),
                    self.resource_type.name
                )));
            }
        };
        Ok(self.resource_type.new_instance(&attributes)?)
    }

    /// Whether any attribute the handler does not provide differs.
    fn update_needed(&self, desired: &TypedObject, current: &TypedObject) -> bool {
        let provided = self.resource_type.provided_attributes();
        let null = Value::Null;
        for attr in &self.resource_type.attributes {
            if provided.contains(&attr.name.as_str()) {
                continue;
            }
            let want = desired.get(&attr.name).unwrap_or(&null);
            let have = current.get(&attr.name).unwrap_or(&null);
            if want != have {
                tracing::debug!(
                    activity = %self.base.name,
                    attribute = %attr.name,
                    desired = %want,
                    actual = %have,
                    "attribute mismatch"
                );
                return true;
            }
        }
        false
    }

    async fn upsert(
        &self,
        ctx: &ActivityContext,
        handler: &Handler,
        ext_id: Option<String>,
        input: OrderedMap,
    ) -> Result<TypedObject> {
        if self.external_id.is_some() {
            let Some(ext_id) = ext_id else {
                return Err(WfeError::MissingIdentity(self.identifier()));
            };
            return self.read(handler, &ext_id).await;
        }

        let desired = self.desired_state(ctx, input).await?;
        let Some(ext_id) = ext_id else {
            return self.create(ctx, handler, &desired).await;
        };

        let current = self.read(handler, &ext_id).await?;
        if !self.update_needed(&desired, &current) {
            tracing::debug!(activity = %self.base.name, external_id = %ext_id, "resource up to date");
            return Ok(current);
        }
        if handler.supports_update {
            return self.update(handler, &ext_id, &desired).await;
        }

        self.delete(ctx, handler, &ext_id).await?;
        self.create(ctx, handler, &desired).await
    }
}

#[async_trait]
impl Activity for Resource {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn style(&self) -> Style {
        Style::Resource
    }

    fn service_id(&self) -> &str {
        &self.base.service_id
    }

    fn input(&self) -> Vec<Parameter> {
        self.base.input.clone()
    }

    fn output(&self) -> Vec<Parameter> {
        self.base.output.clone()
    }

    fn when(&self) -> Option<Condition> {
        self.base.when.clone()
    }

    /// `wfe:///<service-id>/<name>?resource_type=<type>[&external_id=<id>]`
    fn identifier(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("resource_type", &self.resource_type.name);
        if let Some(ext_id) = &self.external_id {
            query.append_pair("external_id", ext_id);
        }
        format!(
            "{}?{}",
            activity_identifier(&self.base.service_id, &self.base.name),
            query.finish()
        )
    }

    /// Outputs are keyed by parameter name; a string value selects the
    /// source attribute instead of aliasing the key.
    fn produces(&self) -> Vec<String> {
        self.base.output.iter().map(|p| p.name.clone()).collect()
    }

    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap> {
        let operation = ctx.operation();
        let label = self.label();
        let input = project_input(&label, &self.base.input, &input, operation)?;
        let handler = self.handler(ctx)?;

        let identifier = self.identifier();
        let _guard = ctx.identity().lock(&identifier).await;
        let require_exists = ctx.config().strict_identity && operation != Operation::Upsert;
        let ext_id = match &self.external_id {
            Some(explicit) => Some(explicit.clone()),
            None => ctx.identity().get_external(&identifier, require_exists)?,
        };
        tracing::debug!(activity = %self.base.name, %operation, external_id = ?ext_id, "reconciling resource");

        let object = match operation {
            Operation::Read => match ext_id {
                Some(ext_id) => self.read(&handler, &ext_id).await?,
                None => return Ok(OrderedMap::new()),
            },
            Operation::Upsert => self.upsert(ctx, &handler, ext_id, input).await?,
            Operation::Delete => {
                if self.external_id.is_none()
                    && let Some(ext_id) = ext_id
                {
                    self.delete(ctx, &handler, &ext_id).await?;
                }
                return Ok(OrderedMap::new());
            }
        };
        project_object(&label, &self.base.output, &object)
    }
}
