//! Board: counts forwarded updates and reports level progress.

use fsm_relay_core::{Handling, Message, MessageType, Payload};
use fsm_relay_system_state_table::{StateTable, TableError};
use fsm_relay_world::{Context, Dispatch};

use crate::{
    messages::{GHOST_CAUGHT, LEVEL_WON},
    Arcade, PLAY_STATE,
};

pub(crate) fn table() -> Result<StateTable<Arcade>, TableError> {
    StateTable::builder()
        .global(MessageType::ON_ENTER, wake)
        .global(MessageType::ON_UPDATE, count)
        .build()
}

fn wake(context: &mut Context<'_, Arcade>, _: &Message) -> Dispatch {
    context.host().board_updates = 0;
    Ok(Handling::Handled)
}

fn count(context: &mut Context<'_, Arcade>, _: &Message) -> Dispatch {
    let arcade = context.host();
    arcade.board_updates += 1;
    let updates = arcade.board_updates;
    let caught = arcade
        .config
        .ghost_caught_at
        .filter(|&at| at == updates)
        .and_then(|_| arcade.ghosts.iter().find(|ghost| ghost.alive))
        .map(|ghost| ghost.entity);
    let won = updates == arcade.config.updates_to_win;

    // A caught ghost freezes play, so a win on the same update is not reported.
    if let Some(ghost) = caught {
        context.send(GHOST_CAUGHT, PLAY_STATE, 0, Payload::Entity(ghost))?;
    } else if won {
        context.send(LEVEL_WON, PLAY_STATE, 0, Payload::None)?;
    }
    Ok(Handling::Handled)
}
