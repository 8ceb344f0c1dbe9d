//! Ghosts wander on delayed self-messages until they are killed.

use fsm_relay_core::{Handling, Message, MessageType, Payload};
use fsm_relay_system_state_table::{StateTable, TableError};
use fsm_relay_world::{Context, Dispatch};
use tracing::debug;

use crate::{
    messages::{KILL, WANDER},
    states::ROAMING,
    Arcade,
};

pub(crate) fn table() -> Result<StateTable<Arcade>, TableError> {
    StateTable::builder()
        .global(MessageType::ON_ENTER, spawn)
        .global(KILL, die)
        .on(ROAMING, MessageType::ON_ENTER, start_roaming)
        .on(ROAMING, WANDER, wander)
        .build()
}

fn spawn(context: &mut Context<'_, Arcade>, _: &Message) -> Dispatch {
    context.request_transition(ROAMING);
    Ok(Handling::Handled)
}

fn start_roaming(context: &mut Context<'_, Arcade>, _: &Message) -> Dispatch {
    let owner = context.owner();
    let wander_delay = context.host().config.wander_delay;
    let Some(spawn) = context.host().ghost_mut(owner).map(|ghost| ghost.spawn) else {
        return Ok(Handling::Unhandled);
    };
    let entity = context.entity();
    context.send(WANDER, entity, wander_delay, Payload::Int(spawn))?;
    Ok(Handling::Handled)
}

fn wander(context: &mut Context<'_, Arcade>, message: &Message) -> Dispatch {
    let owner = context.owner();
    let wander_delay = context.host().config.wander_delay;
    let Some(ghost) = context.host().ghost_mut(owner) else {
        return Ok(Handling::Unhandled);
    };
    // Steps scheduled before the ghost was last respawned are ignored.
    if message.payload.as_int() != Some(ghost.spawn) {
        return Ok(Handling::Handled);
    }
    ghost.wanders += 1;
    let entity = context.entity();
    context.send(WANDER, entity, wander_delay, message.payload)?;
    Ok(Handling::Handled)
}

fn die(context: &mut Context<'_, Arcade>, _: &Message) -> Dispatch {
    let owner = context.owner();
    if let Some(ghost) = context.host().ghost_mut(owner) {
        ghost.alive = false;
    }
    let entity = context.entity();
    debug!(%entity, "ghost killed");
    context.deregister_entity(entity)?;
    Ok(Handling::Handled)
}
