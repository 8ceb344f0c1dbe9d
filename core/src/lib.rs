#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the fsm-relay engine.
//!
//! This crate defines the message surface that connects hosts, the
//! authoritative engine, and behavior systems. Hosts submit [`Command`]
//! values describing registrations, clock advances and sends; the engine
//! executes those commands via its `apply` entry point and journals [`Event`]
//! values describing every delivery, deferral, discard and state transition
//! that the command caused. Behaviors exchange [`Message`] values addressed by
//! [`EntityId`] and answer each one with a [`Handling`] verdict.

mod error;

pub use error::{ConfigurationError, EngineError, PoolError};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default number of entity slots available in a registry.
pub const DEFAULT_ENTITY_CAPACITY: usize = 100;

/// Default number of behavior slots available in a registry.
pub const DEFAULT_BEHAVIOR_CAPACITY: usize = 100;

/// Default number of independent timers held by a timer bank.
pub const DEFAULT_TIMER_COUNT: usize = 100;

/// Default number of slots in the ephemeral value pool.
pub const DEFAULT_POOL_CAPACITY: usize = 5000;

/// Absolute reading of a timer, measured in that timer's ticks.
pub type Tick = u64;

/// Unique identifier assigned to a registered entity.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Slot index of the identifier inside a registry table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Identifier naming a dispatch function, effectively an entity's "class".
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct BehaviorId(u32);

impl BehaviorId {
    /// Creates a new behavior identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Slot index of the identifier inside a behavior table.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a clock inside the timer bank.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimerId(u32);

impl TimerId {
    /// Clock advanced by the host once per frame.
    pub const PRIMARY: Self = Self(0);

    /// Creates a new timer identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Slot index of the identifier inside the timer bank.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// State of an entity's finite state machine.
///
/// [`StateId::GLOBAL`] is reserved for the global state that every behavior
/// consults when its current state leaves a message unhandled. All other
/// values are defined by the behavior itself.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct StateId(u32);

impl StateId {
    /// Global fallback state every entity starts in.
    pub const GLOBAL: Self = Self(0);

    /// Creates a new state identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Reports whether the identifier names the global state.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL.0
    }
}

/// Type tag carried by every message.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageType(u32);

impl MessageType {
    /// Synthesized by the router whenever a state is entered.
    pub const ON_ENTER: Self = Self(0);
    /// Synthesized by the router whenever a state is exited.
    pub const ON_EXIT: Self = Self(1);
    /// Sent by the host once per frame; never synthesized by the router.
    pub const ON_UPDATE: Self = Self(2);
    /// First tag available to behavior-defined messages.
    pub const FIRST_USER: Self = Self(16);

    /// Creates a new message type with the provided numeric tag.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Creates the `offset`-th behavior-defined message type.
    #[must_use]
    pub const fn user(offset: u32) -> Self {
        Self(Self::FIRST_USER.0 + offset)
    }

    /// Retrieves the numeric tag.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Reports whether the tag is one of the router-synthesized transition hooks.
    #[must_use]
    pub const fn is_transition_hook(&self) -> bool {
        self.0 == Self::ON_ENTER.0 || self.0 == Self::ON_EXIT.0
    }
}

macro_rules! display_as_number {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )+
    };
}

display_as_number!(EntityId, BehaviorId, TimerId, StateId, MessageType);

/// Weak back-reference from a state record to host-owned entity data.
///
/// The engine stores the handle but never resolves it; behaviors use it to
/// index into the host's own storage.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct OwnerHandle(u32);

impl OwnerHandle {
    /// Creates a new owner handle pointing at the provided host index.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Index into the host's storage.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Generation-checked reference to a slot in the ephemeral value pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EphemeralHandle {
    slot: u32,
    generation: u32,
}

impl EphemeralHandle {
    /// Creates a handle for the provided slot and generation.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Slot addressed by the handle.
    #[must_use]
    pub const fn slot(&self) -> u32 {
        self.slot
    }

    /// Generation the slot had when the handle was issued.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// Opaque data attached to a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Payload {
    /// No data accompanies the message.
    #[default]
    None,
    /// Small integer embedded by value.
    Int(i32),
    /// Integer held in the ephemeral value pool.
    Ephemeral(EphemeralHandle),
    /// Reference to another entity.
    Entity(EntityId),
}

impl Payload {
    /// Returns the embedded integer, if any.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the ephemeral handle, if any.
    #[must_use]
    pub const fn as_ephemeral(&self) -> Option<EphemeralHandle> {
        match self {
            Self::Ephemeral(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Returns the referenced entity, if any.
    #[must_use]
    pub const fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(entity) => Some(*entity),
            _ => None,
        }
    }
}

/// Message exchanged between entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message {
    /// Type tag selecting the handler.
    pub kind: MessageType,
    /// Sender of the message. Informational only; never checked for liveness.
    pub from: EntityId,
    /// Recipient of the message.
    pub to: EntityId,
    /// Absolute reading of the recipient's timer at which delivery may occur.
    pub due_tick: Tick,
    /// Data attached by the sender.
    pub payload: Payload,
}

impl Message {
    /// Synthesizes a self-addressed transition hook for the provided entity.
    #[must_use]
    pub const fn hook(kind: MessageType, entity: EntityId) -> Self {
        Self {
            kind,
            from: entity,
            to: entity,
            due_tick: 0,
            payload: Payload::None,
        }
    }
}

/// Verdict returned by a behavior for a single dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handling {
    /// The dispatched state consumed the message.
    Handled,
    /// The dispatched state has no handler for the message.
    Unhandled,
}

impl Handling {
    /// Reports whether the message was consumed.
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

impl From<bool> for Handling {
    fn from(handled: bool) -> Self {
        if handled {
            Self::Handled
        } else {
            Self::Unhandled
        }
    }
}

/// Capacities governing a freshly constructed engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of entity slots; valid entity ids are `0..entity_capacity`.
    pub entity_capacity: usize,
    /// Number of behavior slots; valid behavior ids are `0..behavior_capacity`.
    pub behavior_capacity: usize,
    /// Number of independent timers; valid timer ids are `0..timer_count`.
    pub timer_count: usize,
    /// Number of slots in the ephemeral value pool.
    pub pool_capacity: usize,
}

impl EngineConfig {
    /// Creates a configuration with explicit capacities.
    #[must_use]
    pub const fn new(
        entity_capacity: usize,
        behavior_capacity: usize,
        timer_count: usize,
        pool_capacity: usize,
    ) -> Self {
        Self {
            entity_capacity,
            behavior_capacity,
            timer_count,
            pool_capacity,
        }
    }

    /// Returns a copy of the configuration with a different pool capacity.
    #[must_use]
    pub const fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_ENTITY_CAPACITY,
            DEFAULT_BEHAVIOR_CAPACITY,
            DEFAULT_TIMER_COUNT,
            DEFAULT_POOL_CAPACITY,
        )
    }
}

/// Commands that express every host-driven engine operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Creates or replaces the state record stored at `entity`.
    RegisterEntity {
        /// Slot that receives the record.
        entity: EntityId,
        /// Dispatch function governing the entity.
        behavior: BehaviorId,
        /// Optional back-reference into host storage.
        owner: Option<OwnerHandle>,
        /// Clock used for the entity's due-time arithmetic.
        timer: TimerId,
    },
    /// Clears the state record stored at `entity`.
    DeregisterEntity {
        /// Slot to clear.
        entity: EntityId,
    },
    /// Adds ticks to a timer.
    AdvanceTimer {
        /// Timer to advance.
        timer: TimerId,
        /// Number of ticks to add.
        ticks: Tick,
    },
    /// Sends a message, delivering it now or deferring it.
    Send {
        /// Type tag of the message.
        kind: MessageType,
        /// Informational sender.
        from: EntityId,
        /// Recipient of the message.
        to: EntityId,
        /// Ticks of the recipient's timer to wait before delivery.
        delay: Tick,
        /// Data attached to the message.
        payload: Payload,
    },
    /// Delivers every deferred message that has become due.
    Pump,
    /// Drops all records, deferred messages, timer readings and pooled values.
    Reset,
}

/// Events journalled by the engine while executing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// A state record was stored.
    EntityRegistered {
        /// Slot that received the record.
        entity: EntityId,
        /// Behavior governing the entity.
        behavior: BehaviorId,
    },
    /// A state record was cleared.
    EntityDeregistered {
        /// Slot that was cleared.
        entity: EntityId,
    },
    /// A timer advanced.
    TimerAdvanced {
        /// Timer that advanced.
        timer: TimerId,
        /// Reading of the timer after the advance.
        now: Tick,
    },
    /// A message is being dispatched to its recipient's current state.
    MessageDelivered {
        /// Message being delivered.
        message: Message,
        /// State the message was dispatched to.
        state: StateId,
    },
    /// The current state left a message unhandled and the global state was consulted.
    FellBackToGlobal {
        /// Recipient of the message.
        entity: EntityId,
        /// State that declined the message.
        state: StateId,
        /// Type tag of the message.
        kind: MessageType,
    },
    /// A message was queued until its due tick.
    MessageDeferred {
        /// Message that was queued.
        message: Message,
    },
    /// A message addressed to an unregistered entity was dropped.
    MessageDiscarded {
        /// Message that was dropped.
        message: Message,
    },
    /// An entity left a state during a transition cascade.
    StateExited {
        /// Entity that transitioned.
        entity: EntityId,
        /// State that was left.
        state: StateId,
    },
    /// An entity entered a state during a transition cascade.
    StateEntered {
        /// Entity that transitioned.
        entity: EntityId,
        /// State that was entered.
        state: StateId,
    },
    /// The engine discarded all records and queued messages.
    EngineReset,
}
