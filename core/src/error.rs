//! Error types surfaced by the engine and its collaborators.

use thiserror::Error;

use crate::{BehaviorId, EntityId, MessageType, StateId, TimerId};

/// Setup defects in the host: invalid identifiers or duplicate bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// An entity identifier exceeded the registry capacity.
    #[error("entity {entity} is outside the registry capacity of {capacity}")]
    EntityOutOfRange {
        /// Offending identifier.
        entity: EntityId,
        /// Number of entity slots available.
        capacity: usize,
    },
    /// A behavior identifier exceeded the behavior table capacity.
    #[error("behavior {behavior} is outside the behavior capacity of {capacity}")]
    BehaviorOutOfRange {
        /// Offending identifier.
        behavior: BehaviorId,
        /// Number of behavior slots available.
        capacity: usize,
    },
    /// A timer identifier exceeded the timer bank size.
    #[error("timer {timer} is outside the timer bank of {count} timers")]
    TimerOutOfRange {
        /// Offending identifier.
        timer: TimerId,
        /// Number of timers available.
        count: usize,
    },
    /// A behavior identifier was bound twice.
    #[error("behavior {behavior} is already bound")]
    DuplicateBehavior {
        /// Identifier that was already bound.
        behavior: BehaviorId,
    },
    /// A message reached an entity whose behavior was never bound.
    #[error("entity {entity} uses unbound behavior {behavior}")]
    UnboundBehavior {
        /// Entity whose record names the behavior.
        entity: EntityId,
        /// Identifier missing from the behavior table.
        behavior: BehaviorId,
    },
    /// The ephemeral value pool was configured without any slots.
    #[error("ephemeral value pool requires at least one slot")]
    ZeroPoolCapacity,
}

/// Failures reported by `send`, `pump` and the command surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The host violated a configuration invariant.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Neither the current state nor the global state consumed a message.
    #[error("message {message} went unhandled by entity {entity} (behavior {behavior}, state {state})")]
    UnhandledMessage {
        /// Recipient of the message.
        entity: EntityId,
        /// Behavior governing the recipient.
        behavior: BehaviorId,
        /// State the recipient was in when the message arrived.
        state: StateId,
        /// Type tag of the message.
        message: MessageType,
    },
}

/// Failures reported when reading back ephemeral values through handles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The addressed slot has been reissued since the handle was created.
    #[error("ephemeral slot {slot} was reused (handle generation {generation}, current {current})")]
    Stale {
        /// Slot addressed by the handle.
        slot: u32,
        /// Generation recorded in the handle.
        generation: u32,
        /// Generation currently held by the slot.
        current: u32,
    },
    /// The handle addresses a slot outside the pool.
    #[error("ephemeral slot {slot} is outside the pool of {capacity} slots")]
    UnknownSlot {
        /// Slot addressed by the handle.
        slot: u32,
        /// Number of slots in the pool.
        capacity: usize,
    },
}
