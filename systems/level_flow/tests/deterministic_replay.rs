use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use fsm_relay_core::{Command, Event, MessageType, Payload, TimerId};
use fsm_relay_system_level_flow::{install, Arcade, LevelConfig, PLAY_STATE};
use fsm_relay_world::{self as world, query, Engine};

#[test]
fn deterministic_replay_produces_identical_journals() {
    let first = replay(scripted_commands(90));
    let second = replay(scripted_commands(90));

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first.arcade.levels_won() >= 1);
}

#[test]
fn journal_orders_exit_before_enter_for_every_transition() {
    let outcome = replay(scripted_commands(40));
    let mut open_exit = None;

    for event in &outcome.events {
        match event {
            Event::StateExited { entity, .. } => {
                assert!(open_exit.is_none(), "exit without matching enter");
                open_exit = Some(*entity);
            }
            Event::StateEntered { entity, .. } => {
                assert_eq!(open_exit.take(), Some(*entity));
            }
            _ => {}
        }
    }
    assert!(open_exit.is_none());
}

fn replay(commands: Vec<Command>) -> ReplayOutcome {
    let mut engine = Engine::new();
    let mut arcade = install(&mut engine, level()).expect("level installs");
    let mut events = Vec::new();

    for command in commands {
        world::apply(&mut engine, &mut arcade, command, &mut events).expect("command applies");
    }

    let states = query::live_entities(&engine)
        .into_iter()
        .map(|entity| (entity.get(), query::current_state(&engine, entity).map(|s| s.get())))
        .collect();

    ReplayOutcome {
        arcade,
        events,
        states,
    }
}

fn level() -> LevelConfig {
    LevelConfig {
        ready_delay: 80,
        flash_count: 3,
        flash_delay: 20,
        updates_to_win: 12,
        ghost_count: 3,
        wander_delay: 25,
        ghost_caught_at: Some(4),
        freeze_delay: 30,
    }
}

fn scripted_commands(frames: u32) -> Vec<Command> {
    let mut commands = Vec::new();
    for frame in 0..frames {
        let ticks = 8 + u64::from(frame % 5);
        commands.push(Command::AdvanceTimer {
            timer: TimerId::PRIMARY,
            ticks,
        });
        commands.push(Command::Send {
            kind: MessageType::ON_UPDATE,
            from: PLAY_STATE,
            to: PLAY_STATE,
            delay: 0,
            payload: Payload::Int(ticks as i32),
        });
        commands.push(Command::Pump);
    }
    commands
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ReplayOutcome {
    arcade: Arcade,
    events: Vec<Event>,
    states: Vec<(u32, Option<u32>)>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}
