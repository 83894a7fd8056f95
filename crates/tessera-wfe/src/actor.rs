//! Running remote actors.

use std::sync::Arc;

use tessera_rpc::{ActorDefinition, ActorsClient};
use tessera_value::OrderedMap;

use crate::activity::{Activity, RemoteAction};
use crate::context::ActivityContext;
use crate::engine::WorkflowEngine;
use crate::error::Result;

/// Build a workflow engine whose activities are the actor's actions.
pub fn actor_engine(actor: ActorDefinition, client: &ActorsClient) -> Result<WorkflowEngine> {
    let mut engine = WorkflowEngine::new(actor.name.clone(), actor.input, actor.output)
        .with_service_id(actor.name.clone());
    for action in actor.actions {
        engine.add_activity(Arc::new(RemoteAction::new(&actor.name, action, client.clone())?));
    }
    Ok(engine)
}

/// Fetch `actor_name` over `GetActor`, validate it and run it with `input`.
pub async fn run_actor(
    ctx: &ActivityContext,
    actor_name: &str,
    client: &ActorsClient,
    input: OrderedMap,
) -> Result<OrderedMap> {
    let actor = client.get_actor(actor_name).await?;
    tracing::info!(actor = %actor.name, actions = actor.actions.len(), "running actor");

    let engine = actor_engine(actor, client)?;
    engine.validate()?;
    engine.run(ctx, input).await
}
