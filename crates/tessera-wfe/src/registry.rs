//! Registry of loaded services, definitions, handlers and types.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tessera_rpc::{Definition, Namespace, ServiceMetadata, TypedName};
use tessera_value::ObjectType;

use crate::service::Service;

/// Something registered under a [`TypedName`].
#[derive(Clone)]
pub enum Entry {
    Service(Arc<dyn Service>),
    Definition(Definition),
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::Service(_) => f.write_str("Entry::Service"),
            Entry::Definition(def) => write!(f, "Entry::Definition({})", def.name),
        }
    }
}

/// Read-mostly lookup tables filled by the loader.
#[derive(Default)]
pub struct Registry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    definitions: RwLock<HashMap<String, Definition>>,
    handlers: RwLock<HashMap<String, Definition>>,
    types: RwLock<HashMap<String, ObjectType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service(&self, id: impl Into<String>, service: Arc<dyn Service>) {
        let id = id.into();
        tracing::debug!(service = %id, "registering service");
        self.services.write().insert(id, service);
    }

    pub fn service(&self, id: &str) -> Option<Arc<dyn Service>> {
        self.services.read().get(id).cloned()
    }

    /// Register a definition under `Definition/<name>`, and under
    /// `Handler/<type>` when it is a handler.
    pub fn register_definition(&self, definition: Definition) {
        if let Some(type_name) = &definition.handler_for {
            self.handlers
                .write()
                .insert(type_name.clone(), definition.clone());
        }
        self.definitions
            .write()
            .insert(definition.name.clone(), definition);
    }

    pub fn definition(&self, name: &str) -> Option<Definition> {
        self.definitions.read().get(name).cloned()
    }

    /// The handler definition registered for `type_name`.
    pub fn handler(&self, type_name: &str) -> Option<Definition> {
        self.handlers.read().get(type_name).cloned()
    }

    pub fn register_type(&self, object_type: ObjectType) {
        self.types
            .write()
            .insert(object_type.name.clone(), object_type);
    }

    pub fn object_type(&self, name: &str) -> Option<ObjectType> {
        self.types.read().get(name).cloned()
    }

    pub fn lookup(&self, name: &TypedName) -> Option<Entry> {
        match name.namespace {
            Namespace::Service => self.service(&name.name).map(Entry::Service),
            Namespace::Handler => self.handler(&name.name).map(Entry::Definition),
            Namespace::Definition => self.definition(&name.name).map(Entry::Definition),
        }
    }

    /// Register a service together with everything its metadata declares.
    /// Definitions without a service id are attributed to `service`.
    pub fn register_metadata(&self, service: Arc<dyn Service>, metadata: ServiceMetadata) {
        let ServiceMetadata {
            service_id,
            types,
            definitions,
        } = metadata;

        self.register_service(service_id.clone(), service);
        for object_type in types {
            self.register_type(object_type);
        }
        for mut definition in definitions {
            if definition.service_id.is_empty() {
                definition.service_id = service_id.clone();
            }
            self.register_definition(definition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tessera_rpc::Style;
    use tessera_value::{Attribute, Interface, OrderedMap, Type, Value};

    struct NullService;

    #[async_trait]
    impl Service for NullService {
        async fn metadata(&self) -> tessera_rpc::Result<ServiceMetadata> {
            Ok(ServiceMetadata::default())
        }

        async fn invoke(&self, _: &str, _: &str, _: Vec<Value>) -> tessera_rpc::Result<Value> {
            Ok(Value::Null)
        }

        async fn state(&self, _: &str, _: OrderedMap) -> tessera_rpc::Result<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_register_metadata() {
        let registry = Registry::new();
        let metadata = ServiceMetadata {
            service_id: "hosts".into(),
            types: vec![ObjectType::new("Host").with_attribute(Attribute::new("name", Type::String))],
            definitions: vec![
                Definition::new("web", Style::Resource).with_resource_type("Host"),
                Definition::handler("HostHandler", "Host", Interface::new("Host::Handler", ["read"]))
                    .with_service_id("other"),
            ],
        };
        registry.register_metadata(Arc::new(NullService), metadata);

        assert!(registry.service("hosts").is_some());
        assert!(registry.object_type("Host").is_some());
        assert_eq!(registry.definition("web").unwrap().service_id, "hosts");

        let handler = registry.handler("Host").unwrap();
        assert_eq!(handler.name, "HostHandler");
        assert_eq!(handler.service_id, "other");
        assert!(registry.definition("HostHandler").is_some());
    }

    #[test]
    fn test_lookup_by_typed_name() {
        let registry = Registry::new();
        registry.register_service("Puppet", Arc::new(NullService));
        registry.register_definition(Definition::new("greet", Style::Action));

        assert!(matches!(
            registry.lookup(&TypedName::service("Puppet")),
            Some(Entry::Service(_))
        ));
        assert!(matches!(
            registry.lookup(&"Definition/greet".parse().unwrap()),
            Some(Entry::Definition(ref d)) if d.name == "greet"
        ));
        assert!(registry.lookup(&TypedName::handler("Host")).is_none());
    }
}
