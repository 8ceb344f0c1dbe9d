#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Table-driven behaviors keyed by `(state, message type)`.
//!
//! A [`StateTable`] replaces hand-written nested matches over the current
//! state and the incoming message type. Lookups that miss report
//! [`Handling::Unhandled`]; the router then retries the message against the
//! global state, so handlers bound with [`StateTableBuilder::global`] act as
//! the fallback for every other state.

use std::{collections::BTreeMap, fmt};

use fsm_relay_core::{Handling, Message, MessageType, StateId};
use fsm_relay_world::{Behavior, Context, Dispatch};
use thiserror::Error;

/// Handler invoked for one `(state, message type)` pair.
pub type Handler<H> = fn(&mut Context<'_, H>, &Message) -> Dispatch;

/// Errors raised while assembling a state table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum TableError {
    /// Two handlers were bound to the same pair.
    #[error("state {state} already handles message {message}")]
    DuplicateHandler {
        /// State the handlers were bound to.
        state: StateId,
        /// Message type the handlers were bound to.
        message: MessageType,
    },
}

/// Immutable dispatch table implementing [`Behavior`].
pub struct StateTable<H> {
    handlers: BTreeMap<(StateId, MessageType), Handler<H>>,
}

impl<H> StateTable<H> {
    /// Starts assembling a table.
    #[must_use]
    pub fn builder() -> StateTableBuilder<H> {
        StateTableBuilder::default()
    }

    /// Reports whether a handler is bound to the pair.
    #[must_use]
    pub fn handles(&self, state: StateId, message: MessageType) -> bool {
        self.handlers.contains_key(&(state, message))
    }

    /// Number of bound handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Reports whether the table has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<H> Behavior<H> for StateTable<H> {
    fn dispatch(&self, context: &mut Context<'_, H>, state: StateId, message: &Message) -> Dispatch {
        match self.handlers.get(&(state, message.kind)) {
            Some(handler) => handler(context, message),
            None => Ok(Handling::Unhandled),
        }
    }
}

impl<H> fmt::Debug for StateTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(
                self.handlers
                    .keys()
                    .map(|(state, message)| format!("{state}:{message}")),
            )
            .finish()
    }
}

/// Accumulates handler bindings for a [`StateTable`].
pub struct StateTableBuilder<H> {
    handlers: BTreeMap<(StateId, MessageType), Handler<H>>,
    duplicate: Option<TableError>,
}

impl<H> Default for StateTableBuilder<H> {
    fn default() -> Self {
        Self {
            handlers: BTreeMap::new(),
            duplicate: None,
        }
    }
}

impl<H> StateTableBuilder<H> {
    /// Binds a handler that runs in the global state, and as the fallback for every other state.
    #[must_use]
    pub fn global(self, message: MessageType, handler: Handler<H>) -> Self {
        self.on(StateId::GLOBAL, message, handler)
    }

    /// Binds a handler for `message` while the entity occupies `state`.
    #[must_use]
    pub fn on(mut self, state: StateId, message: MessageType, handler: Handler<H>) -> Self {
        if self.handlers.insert((state, message), handler).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(TableError::DuplicateHandler { state, message });
        }
        self
    }

    /// Finishes the table, rejecting it if any pair was bound twice.
    pub fn build(self) -> Result<StateTable<H>, TableError> {
        match self.duplicate {
            Some(err) => Err(err),
            None => Ok(StateTable {
                handlers: self.handlers,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handled(_: &mut Context<'_, ()>, _: &Message) -> Dispatch {
        Ok(Handling::Handled)
    }

    #[test]
    fn builder_records_global_and_state_bindings() {
        let table = StateTable::<()>::builder()
            .global(MessageType::ON_ENTER, handled)
            .on(StateId::new(2), MessageType::user(0), handled)
            .build()
            .expect("distinct bindings");

        assert_eq!(table.len(), 2);
        assert!(table.handles(StateId::GLOBAL, MessageType::ON_ENTER));
        assert!(table.handles(StateId::new(2), MessageType::user(0)));
        assert!(!table.handles(StateId::new(2), MessageType::ON_ENTER));
    }

    #[test]
    fn first_duplicate_binding_is_reported() {
        let result = StateTable::<()>::builder()
            .on(StateId::new(1), MessageType::ON_UPDATE, handled)
            .on(StateId::new(1), MessageType::ON_UPDATE, handled)
            .global(MessageType::ON_EXIT, handled)
            .global(MessageType::ON_EXIT, handled)
            .build();

        assert_eq!(
            result.err(),
            Some(TableError::DuplicateHandler {
                state: StateId::new(1),
                message: MessageType::ON_UPDATE,
            })
        );
    }

    #[test]
    fn duplicate_error_names_the_pair() {
        let err = TableError::DuplicateHandler {
            state: StateId::new(3),
            message: MessageType::new(17),
        };
        assert_eq!(err.to_string(), "state 3 already handles message 17");
    }

    #[test]
    fn debug_lists_bound_pairs() {
        let table = StateTable::<()>::builder()
            .global(MessageType::ON_ENTER, handled)
            .build()
            .expect("table");
        assert_eq!(format!("{table:?}"), "{\"0:0\"}");
        assert!(!table.is_empty());
    }
}
