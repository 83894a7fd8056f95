use std::sync::Arc;

use async_trait::async_trait;
use tessera_rpc::{Definition, Style, TypedName};
use tessera_value::{OrderedMap, Parameter};

use super::{Activity, ActivityBase, create_activity, map_output, project_input, restrict, unmap_output};
use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};
use crate::registry::{Entry, Registry};

/// An activity that delegates to another registered definition.
///
/// Declared input, output and guard override or extend the referenced
/// activity's; empty declarations are inherited.
pub struct Reference {
    base: ActivityBase,
    inner: Arc<dyn Activity>,
}

impl Reference {
    /// Wrap an already built activity.
    pub fn new(def: &Definition, inner: Arc<dyn Activity>) -> Result<Self> {
        Ok(Self {
            base: ActivityBase::from_definition(def)?,
            inner,
        })
    }

    /// Resolve `Definition/<def.reference>` through the registry.
    pub fn from_definition(def: &Definition, registry: &Registry) -> Result<Self> {
        Self::resolve(def, registry, &mut Vec::new())
    }

    fn resolve(def: &Definition, registry: &Registry, chain: &mut Vec<String>) -> Result<Self> {
        if chain.contains(&def.name) {
            chain.push(def.name.clone());
            return Err(WfeError::CycleInWorkflow {
                workflow: def.name.clone(),
                activities: chain.clone(),
            });
        }
        chain.push(def.name.clone());

        let target = def
            .reference
            .as_deref()
            .ok_or_else(|| WfeError::UnknownReference(format!("{} names no reference", def.name)))?;
        let typed = TypedName::definition(target);
        let Some(Entry::Definition(inner_def)) = registry.lookup(&typed) else {
            return Err(WfeError::UnknownReference(typed.to_string()));
        };

        let inner: Arc<dyn Activity> = if inner_def.style == Style::Reference {
            Arc::new(Self::resolve(&inner_def, registry, chain)?)
        } else {
            create_activity(&inner_def, registry)?
        };
        Self::new(def, inner)
    }
}

#[async_trait]
impl Activity for Reference {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn style(&self) -> Style {
        Style::Reference
    }

    fn service_id(&self) -> &str {
        &self.base.service_id
    }

    fn input(&self) -> Vec<Parameter> {
        if self.base.input.is_empty() {
            self.inner.input()
        } else {
            self.base.input.clone()
        }
    }

    fn output(&self) -> Vec<Parameter> {
        if self.base.output.is_empty() {
            self.inner.output()
        } else {
            self.base.output.clone()
        }
    }

    fn when(&self) -> Option<Condition> {
        match (self.base.when.clone(), self.inner.when()) {
            (Some(outer), Some(inner)) => Some(Condition::and(outer, inner)),
            (outer, inner) => outer.or(inner),
        }
    }

    fn produces(&self) -> Vec<String> {
        if self.base.output.is_empty() {
            return self.inner.produces();
        }
        self.base
            .output
            .iter()
            .map(|p| p.external_key().to_string())
            .collect()
    }

    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap> {
        let inner_input = if self.base.input.is_empty() {
            input
        } else {
            let projected = project_input(&self.label(), &self.base.input, &input, ctx.operation())?;
            // rebind to the keys the referenced activity reads
            map_output(&self.inner.input(), projected)
        };

        let result = self.inner.run(ctx, inner_input).await?;
        if self.base.output.is_empty() {
            return Ok(result);
        }

        // resources already key their output by parameter name
        let named = if self.inner.style() == Style::Resource {
            result
        } else {
            unmap_output(&self.inner.output(), result)
        };
        Ok(map_output(&self.base.output, restrict(&self.base.output, named)))
    }
}
