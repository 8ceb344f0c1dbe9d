//! Level state machine: start, ready banner, play, victory flash.

use fsm_relay_core::{
    EntityId, Handling, Message, MessageType, OwnerHandle, Payload, TimerId,
};
use fsm_relay_system_state_table::{StateTable, TableError};
use fsm_relay_world::{Context, Dispatch};
use tracing::{debug, warn};

use crate::{
    messages::{BOARD_FLASH, GHOST_CAUGHT, GO_NORMAL, KILL, LEAVE_START_LEVEL, LEVEL_WON},
    states::{GHOST_KILLED, LEVEL_WON as WON, NORMAL, START_LEVEL, START_LEVEL_ANEW},
    Arcade, BOARD, GHOST_BEHAVIOR, PLAY_STATE,
};

type Ctx<'a> = Context<'a, Arcade>;

pub(crate) fn table() -> Result<StateTable<Arcade>, TableError> {
    StateTable::builder()
        .global(MessageType::ON_ENTER, begin)
        .global(MessageType::ON_UPDATE, idle)
        .on(START_LEVEL_ANEW, MessageType::ON_ENTER, restart_level)
        .on(START_LEVEL, MessageType::ON_ENTER, show_ready)
        .on(START_LEVEL, LEAVE_START_LEVEL, leave_start_level)
        .on(START_LEVEL, MessageType::ON_EXIT, hide_ready)
        .on(NORMAL, MessageType::ON_UPDATE, forward_update)
        .on(NORMAL, LEVEL_WON, level_won)
        .on(NORMAL, GHOST_CAUGHT, ghost_caught)
        .on(GHOST_KILLED, GO_NORMAL, resume)
        .on(WON, MessageType::ON_ENTER, start_flashing)
        .on(WON, BOARD_FLASH, flash)
        .build()
}

fn begin(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    context.request_transition(START_LEVEL_ANEW);
    Ok(Handling::Handled)
}

fn idle(_: &mut Ctx<'_>, _: &Message) -> Dispatch {
    Ok(Handling::Handled)
}

fn restart_level(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    let arcade = context.host();
    arcade.levels_started += 1;
    arcade.board_updates = 0;
    let mut spawned: Vec<EntityId> = Vec::with_capacity(arcade.ghosts.len());
    for ghost in &mut arcade.ghosts {
        ghost.alive = true;
        ghost.spawn += 1;
        spawned.push(ghost.entity);
    }
    debug!(level = arcade.levels_started, ghosts = spawned.len(), "level restarted");

    for (index, entity) in (0u32..).zip(spawned) {
        let owner = OwnerHandle::new(index);
        context.register_entity(entity, GHOST_BEHAVIOR, Some(owner), TimerId::PRIMARY)?;
        context.send(MessageType::ON_ENTER, entity, 0, Payload::None)?;
    }
    context.request_transition(START_LEVEL);
    Ok(Handling::Handled)
}

fn show_ready(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    context.host().show_ready = true;
    let ready_delay = context.host().config.ready_delay;
    debug!(now = ?context.now(), ready_delay, "ready banner shown");
    context.send(MessageType::ON_ENTER, BOARD, 0, Payload::None)?;
    context.send(LEAVE_START_LEVEL, PLAY_STATE, ready_delay, Payload::None)?;
    Ok(Handling::Handled)
}

fn leave_start_level(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    context.request_transition(NORMAL);
    Ok(Handling::Handled)
}

fn hide_ready(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    context.host().show_ready = false;
    Ok(Handling::Handled)
}

fn forward_update(context: &mut Ctx<'_>, message: &Message) -> Dispatch {
    context.send(MessageType::ON_UPDATE, BOARD, 0, message.payload)?;
    Ok(Handling::Handled)
}

fn level_won(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    context.request_transition(WON);
    Ok(Handling::Handled)
}

fn ghost_caught(context: &mut Ctx<'_>, message: &Message) -> Dispatch {
    let Some(ghost) = message.payload.as_entity() else {
        return Ok(Handling::Unhandled);
    };
    let freeze_delay = context.host().config.freeze_delay;
    let remembered = match pool_value(ghost) {
        Some(value) => Payload::Ephemeral(context.pool().alloc(value)),
        None => {
            warn!(%ghost, "ghost id does not fit an ephemeral slot");
            Payload::None
        }
    };

    context.send(KILL, ghost, 0, Payload::None)?;
    context.send(GO_NORMAL, PLAY_STATE, freeze_delay, remembered)?;
    context.request_transition(GHOST_KILLED);
    Ok(Handling::Handled)
}

fn resume(context: &mut Ctx<'_>, message: &Message) -> Dispatch {
    let eaten = message
        .payload
        .as_ephemeral()
        .map(|handle| context.pool().read(handle));
    match eaten {
        Some(Ok(value)) => match eaten_ghost(value) {
            Some(ghost) => context.host().eaten.push(ghost),
            None => warn!(value, "eaten ghost slot holds no entity id"),
        },
        Some(Err(err)) => warn!(%err, "eaten ghost id was overwritten before play resumed"),
        None => warn!("resume message carried no ghost"),
    }
    context.request_transition(NORMAL);
    Ok(Handling::Handled)
}

fn start_flashing(context: &mut Ctx<'_>, _: &Message) -> Dispatch {
    let flash_count = context.host().config.flash_count;
    let handle = context.pool().alloc(flash_count);
    context.send(BOARD_FLASH, PLAY_STATE, 0, Payload::Ephemeral(handle))?;
    Ok(Handling::Handled)
}

fn flash(context: &mut Ctx<'_>, message: &Message) -> Dispatch {
    let Some(handle) = message.payload.as_ephemeral() else {
        return Ok(Handling::Unhandled);
    };
    let remaining = match context.pool().read(handle) {
        Ok(remaining) => remaining,
        Err(err) => {
            warn!(%err, "flash countdown was overwritten, ending it early");
            0
        }
    };

    if remaining <= 0 {
        let arcade = context.host();
        arcade.levels_won += 1;
        debug!(levels_won = arcade.levels_won, "victory sequence finished");
        context.request_transition(START_LEVEL_ANEW);
        return Ok(Handling::Handled);
    }

    context.host().flashes += 1;
    if let Err(err) = context.pool().write(handle, remaining - 1) {
        warn!(%err, "flash countdown could not be decremented");
    }
    let flash_delay = context.host().config.flash_delay;
    context.send(BOARD_FLASH, PLAY_STATE, flash_delay, message.payload)?;
    Ok(Handling::Handled)
}


fn pool_value(entity: EntityId) -> Option<i32> {
    i32::try_from(entity.get()).ok()
}

fn eaten_ghost(value: i32) -> Option<EntityId> {
    u32::try_from(value).ok().map(EntityId::new)
}

#[cfg(test)]
mod pool_value_tests {
    use super::*;

    #[test]
    fn ghost_ids_round_trip_through_pool_values() {
        let ghost = EntityId::new(7);
        assert_eq!(pool_value(ghost).and_then(eaten_ghost), Some(ghost));
    }

    #[test]
    fn out_of_range_values_are_refused_instead_of_truncated() {
        assert_eq!(pool_value(EntityId::new(u32::MAX)), None);
        assert_eq!(eaten_ghost(-1), None);
    }
}
