use async_trait::async_trait;
use tessera_rpc::{ActionDefinition, ActorsClient, Style};
use tessera_value::{OrderedMap, Parameter, Value};

use super::{Activity, ActivityBase, map_output, require_input, restrict};
use crate::condition::Condition;
use crate::context::ActivityContext;
use crate::error::{Result, WfeError};
use crate::genesis::EngineGenesis;

/// One action of a remote actor, run over an `InvokeAction` stream.
///
/// While the action runs the plugin may call back into the engine to
/// resolve nested resources; those callbacks are served by
/// [`EngineGenesis`] under the current operation.
#[derive(Clone)]
pub struct RemoteAction {
    base: ActivityBase,
    client: ActorsClient,
}

impl RemoteAction {
    pub fn new(actor: &str, def: ActionDefinition, client: ActorsClient) -> Result<Self> {
        let when = def.when.as_deref().map(Condition::parse).transpose()?;
        Ok(Self {
            base: ActivityBase {
                name: def.name,
                service_id: actor.to_string(),
                input: def.input,
                output: def.output,
                when,
            },
            client,
        })
    }
}

#[async_trait]
impl Activity for RemoteAction {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn style(&self) -> Style {
        Style::Action
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

    async fn run(&self, ctx: &ActivityContext, input: OrderedMap) -> Result<OrderedMap> {
        let label = self.label();
        let input = require_input(&label, &self.base.input, &input)?;
        let args = OrderedMap::from([
            ("name", Value::from(self.base.name.as_str())),
            ("input", Value::Map(input)),
        ]);

        tracing::debug!(actor = %self.base.service_id, action = %self.base.name, "invoking remote action");
        let genesis = EngineGenesis::new(ctx.clone());
        match self.client.invoke_action(Value::Map(args), &genesis).await? {
            Value::Map(output) => Ok(map_output(&self.base.output, restrict(&self.base.output, output))),
            other => Err(WfeError::bad_shape(format!(
                "{label} returned {}, expected a hash",
                other.type_label()
            ))),
        }
    }
}
