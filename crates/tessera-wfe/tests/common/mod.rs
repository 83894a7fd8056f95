//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_rpc::{Definition, RpcError, ServiceMetadata, Style};
use tessera_value::{Attribute, Interface, ObjectType, OrderedMap, Parameter, Type, TypedObject, Value};
use tessera_wfe::{ActivityContext, EngineConfig, IdentityStore, Operation, Registry, Service};

pub const SERVICE_ID: &str = "hosts";
pub const HANDLER: &str = "HostHandler";

/// One handler call as the plugin saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: String,
    pub args: Vec<Value>,
}

/// In-process plugin managing `Host` objects.
///
/// `Host` has attributes `name`, `ip` and the handler-provided `id`. The
/// handler keeps whatever type it is asked to create, so tests can register
/// further types against it.
pub struct HostPlugin {
    supports_update: bool,
    numeric_ids: AtomicBool,
    next_id: AtomicU32,
    objects: Mutex<BTreeMap<String, TypedObject>>,
    calls: Mutex<Vec<Call>>,
}

impl HostPlugin {
    pub fn new(supports_update: bool) -> Arc<Self> {
        Arc::new(Self {
            supports_update,
            numeric_ids: AtomicBool::new(false),
            next_id: AtomicU32::new(1),
            objects: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn host_type() -> ObjectType {
        ObjectType::new("Host")
            .with_attribute(Attribute::new("name", Type::String))
            .with_attribute(Attribute::new("ip", Type::Optional(Box::new(Type::String))))
            .with_attribute(Attribute::new("id", Type::Optional(Box::new(Type::String))))
            .with_provided_attributes(&["id"])
    }

    pub fn describe(&self) -> ServiceMetadata {
        let mut members = vec!["create", "read", "delete"];
        if self.supports_update {
            members.push("update");
        }
        ServiceMetadata {
            service_id: SERVICE_ID.into(),
            types: vec![Self::host_type()],
            definitions: vec![Definition::handler(
                HANDLER,
                "Host",
                Interface::new("Host::Handler", members),
            )],
        }
    }

    /// Return integer external ids from `create` (`1`, `2`, ...).
    pub fn use_numeric_ids(&self) {
        self.numeric_ids.store(true, Ordering::SeqCst);
    }

    /// Method names of every handler call so far.
    pub fn methods(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.method.clone()).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Attributes of the object stored under `id`.
    pub fn host(&self, id: &str) -> Option<OrderedMap> {
        self.objects.lock().get(id).map(|o| o.attributes.clone())
    }

    pub fn host_count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Create a host outside of any workflow.
    pub fn seed_host(&self, id: &str, name: &str, ip: &str) {
        let attributes = OrderedMap::from([
            ("name", Value::from(name)),
            ("ip", Value::from(ip)),
            ("id", Value::from(id)),
        ]);
        self.objects
            .lock()
            .insert(id.to_string(), TypedObject::new("Host", attributes));
    }

    /// Simulate the external object vanishing.
    pub fn forget(&self, id: &str) {
        self.objects.lock().remove(id);
    }

    fn object_arg(value: Option<&Value>) -> Result<TypedObject, RpcError> {
        value
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| RpcError::remote("expected an object"))
    }

    fn id_arg(args: &[Value]) -> Result<String, RpcError> {
        args.first()
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| RpcError::remote("expected an external id"))
    }
}

#[async_trait]
impl Service for HostPlugin {
    async fn metadata(&self) -> tessera_rpc::Result<ServiceMetadata> {
        Ok(self.describe())
    }

    async fn invoke(&self, identifier: &str, method: &str, args: Vec<Value>) -> tessera_rpc::Result<Value> {
        if identifier != HANDLER {
            return Err(RpcError::remote(format!("no such object {identifier}")));
        }
        self.calls.lock().push(Call {
            method: method.to_string(),
            args: args.clone(),
        });

        match method {
            "create" => {
                let mut object = Self::object_arg(args.first())?;
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                let numeric = self.numeric_ids.load(Ordering::SeqCst);
                let id = if numeric { n.to_string() } else { format!("H{n}") };
                object.attributes.insert("id", Value::from(id.as_str()));
                self.objects.lock().insert(id.clone(), object.clone());
                let ext_id = if numeric { Value::from(i64::from(n)) } else { Value::from(id) };
                Ok(Value::List(vec![Value::Object(object), ext_id]))
            }
            "read" => {
                let id = Self::id_arg(&args)?;
                let object = self.objects.lock().get(&id).cloned();
                object
                    .map(Value::Object)
                    .ok_or_else(|| RpcError::remote(format!("host {id} not found")))
            }
            "update" if self.supports_update => {
                let id = Self::id_arg(&args)?;
                let mut object = Self::object_arg(args.get(1))?;
                object.attributes.insert("id", Value::from(id.as_str()));
                self.objects.lock().insert(id, object.clone());
                Ok(Value::Object(object))
            }
            "delete" => {
                let id = Self::id_arg(&args)?;
                self.objects.lock().remove(&id);
                Ok(Value::Null)
            }
            other => Err(RpcError::remote(format!("unsupported method {other}"))),
        }
    }

    async fn state(&self, _name: &str, input: OrderedMap) -> tessera_rpc::Result<Value> {
        Ok(Value::Map(input))
    }
}

/// Send engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Registry holding the plugin's service, type and handler.
pub fn registry(plugin: &Arc<HostPlugin>) -> Arc<Registry> {
    init_tracing();
    let registry = Registry::new();
    registry.register_metadata(plugin.clone(), plugin.describe());
    Arc::new(registry)
}

/// Register a `Disk` type served by the same handler: `size` plus the
/// provided `id`.
pub fn register_disk(registry: &Registry) {
    registry.register_type(
        ObjectType::new("Disk")
            .with_attribute(Attribute::new("size", Type::Integer))
            .with_attribute(Attribute::new("id", Type::Optional(Box::new(Type::String))))
            .with_provided_attributes(&["id"]),
    );
    registry.register_definition(
        Definition::handler(HANDLER, "Disk", Interface::new("Disk::Handler", ["create", "read", "delete"]))
            .with_service_id(SERVICE_ID),
    );
}

pub fn context(registry: Arc<Registry>, identity: Arc<IdentityStore>, operation: Operation) -> ActivityContext {
    context_with(registry, identity, operation, EngineConfig::default())
}

pub fn context_with(
    registry: Arc<Registry>,
    identity: Arc<IdentityStore>,
    operation: Operation,
    config: EngineConfig,
) -> ActivityContext {
    ActivityContext::new(registry, identity, config.without_identity_db()).with_operation(operation)
}

/// A `Host` resource named `name` reading `name`/`ip` from the dataflow
/// under `prefix`-ed keys and producing `<prefix>_id`.
pub fn host_definition(name: &str, prefix: &str) -> Definition {
    Definition::new(name, Style::Resource)
        .with_service_id(SERVICE_ID)
        .with_resource_type("Host")
        .with_input(Parameter::new("name", Type::String).with_alias(format!("{prefix}_name")))
        .with_input(Parameter::new("ip", Type::Optional(Box::new(Type::String))).with_alias(format!("{prefix}_ip")))
        .with_output(Parameter::new(format!("{prefix}_id"), Type::String).with_alias("id"))
}

pub fn input(pairs: &[(&str, &str)]) -> OrderedMap {
    pairs.iter().map(|(k, v)| (*k, Value::from(*v))).collect()
}
