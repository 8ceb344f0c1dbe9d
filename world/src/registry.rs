//! Entity and behavior tables.

use std::rc::Rc;

use fsm_relay_core::{BehaviorId, ConfigurationError, EntityId, OwnerHandle, StateId, TimerId};

use crate::Behavior;

/// State of a single registered entity's finite state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateRecord {
    entity: EntityId,
    behavior: BehaviorId,
    state: StateId,
    pending: StateId,
    transition_requested: bool,
    timer: TimerId,
    owner: Option<OwnerHandle>,
}

impl StateRecord {
    pub(crate) const fn new(
        entity: EntityId,
        behavior: BehaviorId,
        owner: Option<OwnerHandle>,
        timer: TimerId,
    ) -> Self {
        Self {
            entity,
            behavior,
            state: StateId::GLOBAL,
            pending: StateId::GLOBAL,
            transition_requested: false,
            timer,
            owner,
        }
    }

    /// Identifier of the entity the record describes.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Behavior that dispatches the entity's messages.
    #[must_use]
    pub const fn behavior(&self) -> BehaviorId {
        self.behavior
    }

    /// State the entity currently occupies.
    #[must_use]
    pub const fn state(&self) -> StateId {
        self.state
    }

    /// State recorded by the most recent transition request.
    #[must_use]
    pub const fn pending_state(&self) -> StateId {
        self.pending
    }

    /// Reports whether a transition is waiting to be performed.
    #[must_use]
    pub const fn transition_requested(&self) -> bool {
        self.transition_requested
    }

    /// Timer governing the entity's due-time arithmetic.
    #[must_use]
    pub const fn timer(&self) -> TimerId {
        self.timer
    }

    /// Back-reference into host storage, if one was provided.
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerHandle> {
        self.owner
    }

    pub(crate) fn request_transition(&mut self, next: StateId) {
        self.pending = next;
        self.transition_requested = true;
    }

    /// Clears the transition flag, reporting whether it was set.
    pub(crate) fn take_transition(&mut self) -> bool {
        std::mem::replace(&mut self.transition_requested, false)
    }

    pub(crate) fn enter(&mut self, state: StateId) {
        self.state = state;
    }
}

/// Fixed-capacity tables mapping ids to live records and dispatch functions.
pub(crate) struct EntityRegistry<H> {
    records: Vec<Option<StateRecord>>,
    behaviors: Vec<Option<Rc<dyn Behavior<H>>>>,
}

impl<H> EntityRegistry<H> {
    pub(crate) fn new(entity_capacity: usize, behavior_capacity: usize) -> Self {
        Self {
            records: vec![None; entity_capacity],
            behaviors: (0..behavior_capacity).map(|_| None).collect(),
        }
    }

    pub(crate) fn entity_capacity(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn check_entity(&self, entity: EntityId) -> Result<(), ConfigurationError> {
        if entity.index() < self.records.len() {
            Ok(())
        } else {
            Err(ConfigurationError::EntityOutOfRange {
                entity,
                capacity: self.records.len(),
            })
        }
    }

    /// Stores `record`, replacing whatever occupied its slot.
    pub(crate) fn register_entity(&mut self, record: StateRecord) -> Result<(), ConfigurationError> {
        self.check_entity(record.entity())?;
        self.records[record.entity().index()] = Some(record);
        Ok(())
    }

    /// Clears the slot, returning the record that occupied it.
    pub(crate) fn deregister_entity(
        &mut self,
        entity: EntityId,
    ) -> Result<Option<StateRecord>, ConfigurationError> {
        self.check_entity(entity)?;
        Ok(self.records[entity.index()].take())
    }

    pub(crate) fn lookup(&self, entity: EntityId) -> Option<&StateRecord> {
        self.records.get(entity.index()).and_then(Option::as_ref)
    }

    pub(crate) fn lookup_mut(&mut self, entity: EntityId) -> Option<&mut StateRecord> {
        self.records.get_mut(entity.index()).and_then(Option::as_mut)
    }

    pub(crate) fn register_behavior(
        &mut self,
        id: BehaviorId,
        behavior: Rc<dyn Behavior<H>>,
    ) -> Result<(), ConfigurationError> {
        let capacity = self.behaviors.len();
        let slot = self
            .behaviors
            .get_mut(id.index())
            .ok_or(ConfigurationError::BehaviorOutOfRange {
                behavior: id,
                capacity,
            })?;
        if slot.is_some() {
            return Err(ConfigurationError::DuplicateBehavior { behavior: id });
        }
        *slot = Some(behavior);
        Ok(())
    }

    pub(crate) fn dispatch_for(&self, id: BehaviorId) -> Option<Rc<dyn Behavior<H>>> {
        self.behaviors.get(id.index()).and_then(|slot| slot.clone())
    }

    pub(crate) fn live_entities(&self) -> impl Iterator<Item = &StateRecord> {
        self.records.iter().flatten()
    }

    pub(crate) fn bound_behaviors(&self) -> usize {
        self.behaviors.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn clear_entities(&mut self) {
        self.records.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Context;
    use fsm_relay_core::{EngineError, Handling, Message};

    fn accept_all(
        _: &mut Context<'_, ()>,
        _: StateId,
        _: &Message,
    ) -> Result<Handling, EngineError> {
        Ok(Handling::Handled)
    }

    fn record(entity: u32) -> StateRecord {
        StateRecord::new(
            EntityId::new(entity),
            BehaviorId::new(0),
            None,
            TimerId::PRIMARY,
        )
    }

    #[test]
    fn records_start_in_global_state_without_pending_transition() {
        let record = StateRecord::new(
            EntityId::new(3),
            BehaviorId::new(1),
            Some(OwnerHandle::new(9)),
            TimerId::new(2),
        );
        assert!(record.state().is_global());
        assert!(!record.transition_requested());
        assert_eq!(record.owner(), Some(OwnerHandle::new(9)));
        assert_eq!(record.timer(), TimerId::new(2));
    }

    #[test]
    fn take_transition_clears_the_flag_once() {
        let mut record = record(1);
        record.request_transition(StateId::new(4));
        assert!(record.take_transition());
        assert!(!record.take_transition());
        assert_eq!(record.pending_state(), StateId::new(4));
    }

    #[test]
    fn registration_overwrites_and_deregistration_clears() {
        let mut registry: EntityRegistry<()> = EntityRegistry::new(4, 4);
        registry.register_entity(record(2)).expect("in range");
        registry
            .lookup_mut(EntityId::new(2))
            .expect("registered")
            .enter(StateId::new(5));

        registry.register_entity(record(2)).expect("in range");
        assert!(registry
            .lookup(EntityId::new(2))
            .is_some_and(|record| record.state().is_global()));

        let removed = registry.deregister_entity(EntityId::new(2)).expect("in range");
        assert!(removed.is_some());
        assert!(registry.lookup(EntityId::new(2)).is_none());
    }

    #[test]
    fn out_of_range_entities_are_rejected() {
        let mut registry: EntityRegistry<()> = EntityRegistry::new(2, 1);
        assert_eq!(
            registry.register_entity(record(2)),
            Err(ConfigurationError::EntityOutOfRange {
                entity: EntityId::new(2),
                capacity: 2,
            })
        );
        assert!(registry.deregister_entity(EntityId::new(7)).is_err());
        assert!(registry.lookup(EntityId::new(7)).is_none());
    }

    #[test]
    fn behaviors_bind_exactly_once() {
        let mut registry: EntityRegistry<()> = EntityRegistry::new(1, 2);
        registry
            .register_behavior(BehaviorId::new(1), Rc::new(accept_all))
            .expect("first binding");
        assert_eq!(
            registry.register_behavior(BehaviorId::new(1), Rc::new(accept_all)),
            Err(ConfigurationError::DuplicateBehavior {
                behavior: BehaviorId::new(1),
            })
        );
        assert!(matches!(
            registry.register_behavior(BehaviorId::new(2), Rc::new(accept_all)),
            Err(ConfigurationError::BehaviorOutOfRange { .. })
        ));
        assert!(registry.dispatch_for(BehaviorId::new(1)).is_some());
        assert!(registry.dispatch_for(BehaviorId::new(0)).is_none());
        assert_eq!(registry.bound_behaviors(), 1);
    }
}
