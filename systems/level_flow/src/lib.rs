#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Scripted level choreography built from state tables.
//!
//! Three behaviors cooperate through the engine: a play-state that walks a
//! level from start to victory, a board that reports progress after a number
//! of forwarded updates, and ghosts that wander on delayed self-messages
//! until the play-state kills them. The host storage they share is
//! [`Arcade`].

mod board;
mod ghost;
mod play;

use fsm_relay_core::{
    BehaviorId, EngineError, EntityId, MessageType, OwnerHandle, Payload, Tick, TimerId,
};
use fsm_relay_system_state_table::TableError;
use fsm_relay_world::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Entity running the level state machine.
pub const PLAY_STATE: EntityId = EntityId::new(1);
/// Entity counting updates and reporting level progress.
pub const BOARD: EntityId = EntityId::new(2);
/// First ghost entity; ghost `n` is registered at `FIRST_GHOST + n`.
pub const FIRST_GHOST: EntityId = EntityId::new(3);

/// Behavior bound to [`PLAY_STATE`].
pub const PLAY_STATE_BEHAVIOR: BehaviorId = BehaviorId::new(1);
/// Behavior bound to [`BOARD`].
pub const BOARD_BEHAVIOR: BehaviorId = BehaviorId::new(2);
/// Behavior shared by every ghost.
pub const GHOST_BEHAVIOR: BehaviorId = BehaviorId::new(3);

/// States occupied by the level behaviors.
pub mod states {
    use fsm_relay_core::StateId;

    /// Play-state: the level is running and updates reach the board.
    pub const NORMAL: StateId = StateId::new(1);
    /// Play-state: the victory flash countdown is running.
    pub const LEVEL_WON: StateId = StateId::new(2);
    /// Play-state: the ready banner is showing.
    pub const START_LEVEL: StateId = StateId::new(4);
    /// Play-state: ghosts are being (re)spawned for a fresh level.
    pub const START_LEVEL_ANEW: StateId = StateId::new(5);
    /// Play-state: play is frozen after a ghost was killed.
    pub const GHOST_KILLED: StateId = StateId::new(8);
    /// Ghost: wandering on delayed self-messages.
    pub const ROAMING: StateId = StateId::new(1);
}

/// Message types exchanged by the level behaviors.
pub mod messages {
    use fsm_relay_core::MessageType;

    /// Board reports that the level was cleared.
    pub const LEVEL_WON: MessageType = MessageType::user(0);
    /// Delayed self-message driving the victory flash countdown.
    pub const BOARD_FLASH: MessageType = MessageType::user(1);
    /// Delayed self-message ending the ready banner.
    pub const LEAVE_START_LEVEL: MessageType = MessageType::user(2);
    /// Board reports that the ghost in the payload was caught.
    pub const GHOST_CAUGHT: MessageType = MessageType::user(3);
    /// Delayed self-message resuming play after a ghost was killed.
    pub const GO_NORMAL: MessageType = MessageType::user(4);
    /// Tells a ghost to die.
    pub const KILL: MessageType = MessageType::user(5);
    /// Delayed self-message moving a roaming ghost.
    pub const WANDER: MessageType = MessageType::user(6);
}

/// Timings and counts governing the scripted level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Ticks the ready banner stays up before play starts.
    pub ready_delay: Tick,
    /// Number of board flashes played after a win.
    pub flash_count: i32,
    /// Ticks between two victory flashes.
    pub flash_delay: Tick,
    /// Forwarded updates after which the board reports a win.
    pub updates_to_win: u32,
    /// Number of ghosts registered at every level start.
    pub ghost_count: u32,
    /// Ticks between two ghost wander steps.
    pub wander_delay: Tick,
    /// Forwarded update on which the board reports a caught ghost.
    pub ghost_caught_at: Option<u32>,
    /// Ticks play stays frozen after a ghost is killed.
    pub freeze_delay: Tick,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            ready_delay: 3000,
            flash_count: 10,
            flash_delay: 500,
            updates_to_win: 240,
            ghost_count: 4,
            wander_delay: 500,
            ghost_caught_at: Some(60),
            freeze_delay: 1000,
        }
    }
}

/// Per-ghost data owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ghost {
    entity: EntityId,
    alive: bool,
    spawn: i32,
    wanders: u32,
}

impl Ghost {
    fn new(entity: EntityId) -> Self {
        Self {
            entity,
            alive: false,
            spawn: 0,
            wanders: 0,
        }
    }

    /// Entity the ghost is registered as.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Reports whether the ghost is currently registered.
    #[must_use]
    pub const fn alive(&self) -> bool {
        self.alive
    }

    /// Number of times the ghost has been (re)registered.
    #[must_use]
    pub const fn spawn(&self) -> i32 {
        self.spawn
    }

    /// Wander steps taken since the engine started.
    #[must_use]
    pub const fn wanders(&self) -> u32 {
        self.wanders
    }
}

/// Host storage shared by the level behaviors.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Arcade {
    config: LevelConfig,
    levels_started: u32,
    levels_won: u32,
    flashes: u32,
    board_updates: u32,
    show_ready: bool,
    ghosts: Vec<Ghost>,
    eaten: Vec<EntityId>,
}

impl Arcade {
    fn new(config: LevelConfig) -> Self {
        let ghosts = (0..config.ghost_count)
            .map(|index| Ghost::new(ghost_entity(index)))
            .collect();
        Self {
            config,
            levels_started: 0,
            levels_won: 0,
            flashes: 0,
            board_updates: 0,
            show_ready: false,
            ghosts,
            eaten: Vec::new(),
        }
    }

    /// Configuration the level was installed with.
    #[must_use]
    pub const fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// Number of times a level was (re)started.
    #[must_use]
    pub const fn levels_started(&self) -> u32 {
        self.levels_started
    }

    /// Number of completed victory sequences.
    #[must_use]
    pub const fn levels_won(&self) -> u32 {
        self.levels_won
    }

    /// Board flashes played across every victory.
    #[must_use]
    pub const fn flashes(&self) -> u32 {
        self.flashes
    }

    /// Updates the board has counted since the current level started.
    #[must_use]
    pub const fn board_updates(&self) -> u32 {
        self.board_updates
    }

    /// Reports whether the ready banner is showing.
    #[must_use]
    pub const fn show_ready(&self) -> bool {
        self.show_ready
    }

    /// Every ghost slot, alive or not.
    #[must_use]
    pub fn ghosts(&self) -> &[Ghost] {
        &self.ghosts
    }

    /// Ghosts killed so far, in order.
    #[must_use]
    pub fn eaten(&self) -> &[EntityId] {
        &self.eaten
    }

    fn ghost_mut(&mut self, owner: Option<OwnerHandle>) -> Option<&mut Ghost> {
        owner.and_then(|handle| self.ghosts.get_mut(handle.index()))
    }
}

/// Entity id of the `index`-th ghost.
#[must_use]
pub const fn ghost_entity(index: u32) -> EntityId {
    EntityId::new(FIRST_GHOST.get() + index)
}

/// Errors raised while installing the level behaviors.
#[derive(Debug, Error)]
pub enum InstallError {
    /// A behavior table was malformed.
    #[error("behavior table rejected: {0}")]
    Table(#[from] TableError),
    /// The engine refused a registration or the opening message.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Binds the level behaviors, registers the play-state and board, and starts
/// the first level.
pub fn install(engine: &mut Engine<Arcade>, config: LevelConfig) -> Result<Arcade, InstallError> {
    engine
        .register_behavior(PLAY_STATE_BEHAVIOR, play::table()?)
        .map_err(EngineError::from)?;
    engine
        .register_behavior(BOARD_BEHAVIOR, board::table()?)
        .map_err(EngineError::from)?;
    engine
        .register_behavior(GHOST_BEHAVIOR, ghost::table()?)
        .map_err(EngineError::from)?;

    engine
        .register_entity(PLAY_STATE, PLAY_STATE_BEHAVIOR, None, TimerId::PRIMARY)
        .map_err(EngineError::from)?;
    engine
        .register_entity(BOARD, BOARD_BEHAVIOR, None, TimerId::PRIMARY)
        .map_err(EngineError::from)?;

    let mut arcade = Arcade::new(config);
    engine.send(
        &mut arcade,
        MessageType::ON_ENTER,
        PLAY_STATE,
        PLAY_STATE,
        0,
        Payload::None,
    )?;
    Ok(arcade)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_ids_follow_the_board() {
        assert_eq!(ghost_entity(0), FIRST_GHOST);
        assert_eq!(ghost_entity(3), EntityId::new(6));
    }

    #[test]
    fn arcade_allocates_one_slot_per_ghost() {
        let arcade = Arcade::new(LevelConfig {
            ghost_count: 2,
            ..LevelConfig::default()
        });
        let entities: Vec<EntityId> = arcade.ghosts().iter().map(Ghost::entity).collect();
        assert_eq!(entities, vec![EntityId::new(3), EntityId::new(4)]);
        assert!(arcade.ghosts().iter().all(|ghost| !ghost.alive()));
    }

    #[test]
    fn owner_handles_resolve_ghost_slots() {
        let mut arcade = Arcade::new(LevelConfig::default());
        assert!(arcade.ghost_mut(Some(OwnerHandle::new(1))).is_some());
        assert!(arcade.ghost_mut(Some(OwnerHandle::new(40))).is_none());
        assert!(arcade.ghost_mut(None).is_none());
    }
}
