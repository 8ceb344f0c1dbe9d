#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative engine state for fsm-relay.
//!
//! An [`Engine`] owns the timer bank, the entity and behavior tables, the
//! deferred message queue and the ephemeral value pool. Hosts drive it once
//! per frame by advancing timers and pumping the queue, either through the
//! inherent methods or through [`apply`], which additionally journals every
//! routing decision as an [`Event`].

mod pool;
mod queue;
mod registry;
mod timers;

pub use pool::EphemeralPool;
pub use registry::StateRecord;

use std::{fmt, rc::Rc};

use fsm_relay_core::{
    BehaviorId, Command, ConfigurationError, EngineConfig, EngineError, EntityId, Event,
    Handling, Message, MessageType, OwnerHandle, Payload, StateId, Tick, TimerId,
};
use tracing::{debug, error, trace};

use crate::{queue::DeferredQueue, registry::EntityRegistry, timers::TimerBank};

/// Outcome of a single behavior dispatch.
pub type Dispatch = Result<Handling, EngineError>;

/// Dispatch function shared by every entity of one behavior id.
///
/// `state` is the state the message is being dispatched to. It equals the
/// entity's current state on the first attempt and [`StateId::GLOBAL`] on the
/// fallback attempt.
pub trait Behavior<H> {
    /// Handles `message` for the entity bound to `context`.
    fn dispatch(&self, context: &mut Context<'_, H>, state: StateId, message: &Message)
        -> Dispatch;
}

impl<H, F> Behavior<H> for F
where
    F: Fn(&mut Context<'_, H>, StateId, &Message) -> Dispatch,
{
    fn dispatch(
        &self,
        context: &mut Context<'_, H>,
        state: StateId,
        message: &Message,
    ) -> Dispatch {
        self(context, state, message)
    }
}

/// Counters accumulated over the lifetime of an engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Messages dispatched to a recipient.
    pub delivered: u64,
    /// Messages queued until a later tick.
    pub deferred: u64,
    /// Messages dropped because their recipient was absent.
    pub discarded: u64,
    /// Deliveries that were retried against the global state.
    pub fallbacks: u64,
    /// State changes performed by transition cascades.
    pub transitions: u64,
}

/// Message router and the state it routes against.
pub struct Engine<H> {
    config: EngineConfig,
    timers: TimerBank,
    registry: EntityRegistry<H>,
    queue: DeferredQueue,
    pool: EphemeralPool,
    stats: Stats,
    journal: Option<Vec<Event>>,
}

impl<H> Engine<H> {
    /// Creates an engine with the default capacities.
    #[must_use]
    pub fn new() -> Self {
        Self::assemble(EngineConfig::default(), EphemeralPool::default())
    }

    /// Creates an engine with explicit capacities.
    pub fn with_config(config: EngineConfig) -> Result<Self, ConfigurationError> {
        let pool = EphemeralPool::with_capacity(config.pool_capacity)?;
        Ok(Self::assemble(config, pool))
    }

    fn assemble(config: EngineConfig, pool: EphemeralPool) -> Self {
        Self {
            config,
            timers: TimerBank::new(config.timer_count),
            registry: EntityRegistry::new(config.entity_capacity, config.behavior_capacity),
            queue: DeferredQueue::new(),
            pool,
            stats: Stats::default(),
            journal: None,
        }
    }

    /// Binds a dispatch function to `id`.
    pub fn register_behavior<B>(
        &mut self,
        id: BehaviorId,
        behavior: B,
    ) -> Result<(), ConfigurationError>
    where
        B: Behavior<H> + 'static,
    {
        self.registry.register_behavior(id, Rc::new(behavior))?;
        debug!(behavior = %id, "behavior registered");
        Ok(())
    }

    /// Creates or replaces the record stored at `entity`.
    ///
    /// The behavior id is not required to be bound yet; a delivery to an
    /// entity whose behavior is still unbound fails instead.
    pub fn register_entity(
        &mut self,
        entity: EntityId,
        behavior: BehaviorId,
        owner: Option<OwnerHandle>,
        timer: TimerId,
    ) -> Result<(), ConfigurationError> {
        self.timers.check(timer)?;
        self.registry
            .register_entity(StateRecord::new(entity, behavior, owner, timer))?;
        debug!(%entity, %behavior, %timer, "entity registered");
        self.record(Event::EntityRegistered { entity, behavior });
        Ok(())
    }

    /// Clears the record stored at `entity`.
    ///
    /// Messages already queued for the entity are dropped when they fall due.
    pub fn deregister_entity(&mut self, entity: EntityId) -> Result<(), ConfigurationError> {
        if self.registry.deregister_entity(entity)?.is_some() {
            debug!(%entity, "entity deregistered");
            self.record(Event::EntityDeregistered { entity });
        }
        Ok(())
    }

    /// Adds `ticks` to a timer.
    pub fn advance_timer(&mut self, timer: TimerId, ticks: Tick) -> Result<(), ConfigurationError> {
        let now = self.timers.advance(timer, ticks)?;
        trace!(%timer, now, "timer advanced");
        self.record(Event::TimerAdvanced { timer, now });
        Ok(())
    }

    /// Sends a message to `to`, due `delay` ticks from now on the recipient's timer.
    ///
    /// A zero-delay message is delivered, including any transition cascade it
    /// triggers, before this call returns.
    pub fn send(
        &mut self,
        host: &mut H,
        kind: MessageType,
        from: EntityId,
        to: EntityId,
        delay: Tick,
        payload: Payload,
    ) -> Result<(), EngineError> {
        self.registry.check_entity(to)?;
        let timer = self
            .registry
            .lookup(to)
            .map_or(TimerId::PRIMARY, StateRecord::timer);
        let now = self.timers.read(timer).unwrap_or_default();
        let message = Message {
            kind,
            from,
            to,
            due_tick: now.saturating_add(delay),
            payload,
        };
        self.route(host, message)
    }

    /// Delivers every queued message that has fallen due.
    ///
    /// Messages produced while pumping are queued for the next pump unless
    /// they are already due, in which case they are delivered inline.
    pub fn pump(&mut self, host: &mut H) -> Result<(), EngineError> {
        let registry = &self.registry;
        let timers = &self.timers;
        let sweep = self.queue.collect_ready(|entity| {
            registry
                .lookup(entity)
                .and_then(|record| timers.read(record.timer()))
        });

        for message in sweep.orphaned {
            self.discard(message);
        }

        let mut ready = sweep.ready.into_iter();
        while let Some(message) = ready.next() {
            if let Err(err) = self.route(host, message) {
                for remaining in ready {
                    self.queue.insert(remaining);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Drops every record, queued message, timer reading and pooled value.
    ///
    /// Behavior bindings and lifetime statistics survive.
    pub fn reset(&mut self) {
        let live = self.registry.live_entities().count();
        self.registry.clear_entities();
        self.queue.clear();
        self.timers.reset();
        self.pool.reset();
        debug!(
            live,
            behaviors = self.registry.bound_behaviors(),
            "engine reset"
        );
        self.record(Event::EngineReset);
    }

    /// Number of messages waiting in the deferred queue.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Mutable access to the ephemeral value pool.
    pub fn pool(&mut self) -> &mut EphemeralPool {
        &mut self.pool
    }

    fn route(&mut self, host: &mut H, message: Message) -> Result<(), EngineError> {
        let Some(now) = self.now_for(message.to) else {
            self.discard(message);
            return Ok(());
        };

        if message.due_tick <= now {
            return self.deliver(host, message);
        }

        debug!(
            to = %message.to,
            kind = %message.kind,
            due = message.due_tick,
            now,
            "message deferred"
        );
        self.stats.deferred += 1;
        self.record(Event::MessageDeferred { message });
        self.queue.insert(message);
        Ok(())
    }

    fn deliver(&mut self, host: &mut H, message: Message) -> Result<(), EngineError> {
        let entity = message.to;
        let Some(record) = self.registry.lookup(entity) else {
            self.discard(message);
            return Ok(());
        };
        // A request left by an enclosing dispatch is honoured before this
        // message sees the entity.
        if record.transition_requested() {
            self.cascade(host, entity)?;
        }
        let Some(record) = self.registry.lookup(entity) else {
            self.discard(message);
            return Ok(());
        };
        let (behavior_id, state, owner) = (record.behavior(), record.state(), record.owner());
        let behavior = self.behavior_for(entity, behavior_id)?;

        trace!(%entity, %state, kind = %message.kind, from = %message.from, "delivering message");
        self.stats.delivered += 1;
        self.record(Event::MessageDelivered { message, state });

        let mut handling = self.invoke(behavior.as_ref(), host, entity, owner, state, &message)?;
        if !handling.is_handled() && !state.is_global() {
            self.stats.fallbacks += 1;
            self.record(Event::FellBackToGlobal {
                entity,
                state,
                kind: message.kind,
            });
            handling = self.invoke(
                behavior.as_ref(),
                host,
                entity,
                owner,
                StateId::GLOBAL,
                &message,
            )?;
        }

        if !handling.is_handled() {
            error!(
                %entity,
                behavior = %behavior_id,
                %state,
                kind = %message.kind,
                "message went unhandled"
            );
            return Err(EngineError::UnhandledMessage {
                entity,
                behavior: behavior_id,
                state,
                message: message.kind,
            });
        }

        self.cascade(host, entity)
    }

    /// Performs requested transitions until a pass requests no further one.
    fn cascade(&mut self, host: &mut H, entity: EntityId) -> Result<(), EngineError> {
        loop {
            let Some(record) = self.registry.lookup_mut(entity) else {
                return Ok(());
            };
            if !record.take_transition() {
                return Ok(());
            }
            let (behavior_id, previous, owner) = (record.behavior(), record.state(), record.owner());
            let behavior = self.behavior_for(entity, behavior_id)?;

            self.record(Event::StateExited {
                entity,
                state: previous,
            });
            let exit = Message::hook(MessageType::ON_EXIT, entity);
            let _ = self.invoke(behavior.as_ref(), host, entity, owner, previous, &exit)?;

            // Exit hooks may deregister the entity or redirect the pending state.
            // A redirect also leaves the flag set, so the loop runs another pass.
            let Some(record) = self.registry.lookup_mut(entity) else {
                return Ok(());
            };
            let next = record.pending_state();
            record.enter(next);
            let (behavior_id, owner) = (record.behavior(), record.owner());
            let behavior = self.behavior_for(entity, behavior_id)?;

            debug!(%entity, from = %previous, to = %next, "state transition");
            self.stats.transitions += 1;
            self.record(Event::StateEntered {
                entity,
                state: next,
            });
            let enter = Message::hook(MessageType::ON_ENTER, entity);
            let _ = self.invoke(behavior.as_ref(), host, entity, owner, next, &enter)?;
        }
    }

    fn invoke(
        &mut self,
        behavior: &dyn Behavior<H>,
        host: &mut H,
        entity: EntityId,
        owner: Option<OwnerHandle>,
        state: StateId,
        message: &Message,
    ) -> Dispatch {
        let mut context = Context {
            engine: self,
            host,
            entity,
            owner,
        };
        behavior.dispatch(&mut context, state, message)
    }

    fn behavior_for(
        &self,
        entity: EntityId,
        behavior: BehaviorId,
    ) -> Result<Rc<dyn Behavior<H>>, ConfigurationError> {
        self.registry
            .dispatch_for(behavior)
            .ok_or(ConfigurationError::UnboundBehavior { entity, behavior })
    }

    fn now_for(&self, entity: EntityId) -> Option<Tick> {
        self.registry
            .lookup(entity)
            .and_then(|record| self.timers.read(record.timer()))
    }

    fn discard(&mut self, message: Message) {
        debug!(to = %message.to, kind = %message.kind, "recipient absent, message discarded");
        self.stats.discarded += 1;
        self.record(Event::MessageDiscarded { message });
    }

    fn record(&mut self, event: Event) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(event);
        }
    }
}

impl<H> Default for Engine<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for Engine<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("timers", &self.timers)
            .field("live_entities", &self.registry.live_entities().count())
            .field("entity_capacity", &self.registry.entity_capacity())
            .field("bound_behaviors", &self.registry.bound_behaviors())
            .field("pending", &self.queue.len())
            .field("pool", &self.pool)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Handle through which a behavior acts on the engine during one dispatch.
///
/// The context is bound to the entity being dispatched; transition requests
/// always target that entity.
pub struct Context<'a, H> {
    engine: &'a mut Engine<H>,
    host: &'a mut H,
    entity: EntityId,
    owner: Option<OwnerHandle>,
}

impl<H> Context<'_, H> {
    /// Entity the message was delivered to.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Back-reference into host storage supplied at registration.
    #[must_use]
    pub fn owner(&self) -> Option<OwnerHandle> {
        self.owner
    }

    /// Host-owned entity storage.
    pub fn host(&mut self) -> &mut H {
        &mut *self.host
    }

    /// Read-only view of the engine, for use with [`query`].
    #[must_use]
    pub fn engine(&self) -> &Engine<H> {
        &*self.engine
    }

    /// Ephemeral value pool shared by every behavior.
    pub fn pool(&mut self) -> &mut EphemeralPool {
        &mut self.engine.pool
    }

    /// Current reading of the entity's timer.
    ///
    /// Returns `None` once the entity has deregistered itself.
    #[must_use]
    pub fn now(&self) -> Option<Tick> {
        self.engine.now_for(self.entity)
    }

    /// Sends a message from the dispatched entity.
    pub fn send(
        &mut self,
        kind: MessageType,
        to: EntityId,
        delay: Tick,
        payload: Payload,
    ) -> Result<(), EngineError> {
        self.engine
            .send(self.host, kind, self.entity, to, delay, payload)
    }

    /// Asks the router to move the dispatched entity into `next`.
    ///
    /// The transition runs after the current dispatch returns. A later request
    /// made during the same dispatch replaces the target.
    pub fn request_transition(&mut self, next: StateId) {
        if let Some(record) = self.engine.registry.lookup_mut(self.entity) {
            record.request_transition(next);
        }
    }

    /// Creates or replaces an entity record.
    pub fn register_entity(
        &mut self,
        entity: EntityId,
        behavior: BehaviorId,
        owner: Option<OwnerHandle>,
        timer: TimerId,
    ) -> Result<(), ConfigurationError> {
        self.engine.register_entity(entity, behavior, owner, timer)
    }

    /// Clears an entity record, possibly the dispatched entity's own.
    pub fn deregister_entity(&mut self, entity: EntityId) -> Result<(), ConfigurationError> {
        self.engine.deregister_entity(entity)
    }
}

/// Applies the provided command to the engine and journals what it caused.
pub fn apply<H>(
    engine: &mut Engine<H>,
    host: &mut H,
    command: Command,
    out_events: &mut Vec<Event>,
) -> Result<(), EngineError> {
    let outer = engine.journal.replace(Vec::new());
    let result = match command {
        Command::RegisterEntity {
            entity,
            behavior,
            owner,
            timer,
        } => engine
            .register_entity(entity, behavior, owner, timer)
            .map_err(EngineError::from),
        Command::DeregisterEntity { entity } => {
            engine.deregister_entity(entity).map_err(EngineError::from)
        }
        Command::AdvanceTimer { timer, ticks } => {
            engine.advance_timer(timer, ticks).map_err(EngineError::from)
        }
        Command::Send {
            kind,
            from,
            to,
            delay,
            payload,
        } => engine.send(host, kind, from, to, delay, payload),
        Command::Pump => engine.pump(host),
        Command::Reset => {
            engine.reset();
            Ok(())
        }
    };

    if let Some(mut journal) = std::mem::replace(&mut engine.journal, outer) {
        out_events.append(&mut journal);
    }
    result
}

/// Query functions that provide read-only access to the engine state.
pub mod query {
    use super::{Engine, Stats, StateRecord};
    use fsm_relay_core::{EngineConfig, EntityId, Message, StateId, Tick, TimerId};

    /// Retrieves the record stored for `entity`.
    #[must_use]
    pub fn record<H>(engine: &Engine<H>, entity: EntityId) -> Option<&StateRecord> {
        engine.registry.lookup(entity)
    }

    /// State currently occupied by `entity`.
    #[must_use]
    pub fn current_state<H>(engine: &Engine<H>, entity: EntityId) -> Option<StateId> {
        record(engine, entity).map(StateRecord::state)
    }

    /// Current reading of a timer.
    #[must_use]
    pub fn timer_ticks<H>(engine: &Engine<H>, timer: TimerId) -> Option<Tick> {
        engine.timers.read(timer)
    }

    /// Registered entity ids in ascending order.
    #[must_use]
    pub fn live_entities<H>(engine: &Engine<H>) -> Vec<EntityId> {
        engine
            .registry
            .live_entities()
            .map(StateRecord::entity)
            .collect()
    }

    /// Snapshot of the deferred queue in insertion order.
    #[must_use]
    pub fn pending_messages<H>(engine: &Engine<H>) -> Vec<Message> {
        engine.queue.iter().copied().collect()
    }

    /// Lifetime routing statistics.
    #[must_use]
    pub fn stats<H>(engine: &Engine<H>) -> Stats {
        engine.stats
    }

    /// Capacities the engine was constructed with.
    #[must_use]
    pub fn config<H>(engine: &Engine<H>) -> &EngineConfig {
        &engine.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKER: BehaviorId = BehaviorId::new(1);
    const PING: MessageType = MessageType::user(0);
    const BUSY: StateId = StateId::new(1);

    #[derive(Debug, Default)]
    struct Tape {
        seen: Vec<(EntityId, StateId, MessageType)>,
    }

    fn recording(context: &mut Context<'_, Tape>, state: StateId, message: &Message) -> Dispatch {
        let entity = context.entity();
        context.host().seen.push((entity, state, message.kind));
        if message.kind == PING && state.is_global() {
            context.request_transition(BUSY);
        }
        Ok(Handling::from(state.is_global() || message.kind.is_transition_hook()))
    }

    fn engine() -> Engine<Tape> {
        let mut engine = Engine::with_config(EngineConfig::new(8, 4, 2, 16)).expect("config");
        engine
            .register_behavior(WORKER, recording)
            .expect("behavior binds");
        engine
    }

    #[test]
    fn zero_pool_capacity_is_rejected() {
        let result = Engine::<Tape>::with_config(EngineConfig::default().with_pool_capacity(0));
        assert!(matches!(result, Err(ConfigurationError::ZeroPoolCapacity)));
    }

    #[test]
    fn registration_validates_entity_and_timer_ranges() {
        let mut engine = engine();
        assert!(matches!(
            engine.register_entity(EntityId::new(8), WORKER, None, TimerId::PRIMARY),
            Err(ConfigurationError::EntityOutOfRange { .. })
        ));
        assert!(matches!(
            engine.register_entity(EntityId::new(1), WORKER, None, TimerId::new(2)),
            Err(ConfigurationError::TimerOutOfRange { .. })
        ));
        assert!(query::live_entities(&engine).is_empty());
    }

    #[test]
    fn immediate_send_runs_fallback_and_cascade_before_returning() {
        let mut engine = engine();
        let mut tape = Tape::default();
        let entity = EntityId::new(3);
        engine
            .register_entity(entity, WORKER, None, TimerId::PRIMARY)
            .expect("register");

        engine
            .send(&mut tape, PING, entity, entity, 0, Payload::None)
            .expect("handled by global state");

        assert_eq!(
            tape.seen,
            vec![
                (entity, StateId::GLOBAL, PING),
                (entity, StateId::GLOBAL, MessageType::ON_EXIT),
                (entity, BUSY, MessageType::ON_ENTER),
            ]
        );
        assert_eq!(query::current_state(&engine, entity), Some(BUSY));

        tape.seen.clear();
        engine
            .send(&mut tape, PING, entity, entity, 0, Payload::None)
            .expect("falls back to global");
        assert_eq!(tape.seen[0], (entity, BUSY, PING));
        assert_eq!(tape.seen[1], (entity, StateId::GLOBAL, PING));
        assert_eq!(query::stats(&engine).fallbacks, 1);
    }

    #[test]
    fn unbound_behavior_fails_at_delivery() {
        let mut engine = engine();
        let mut tape = Tape::default();
        let entity = EntityId::new(2);
        engine
            .register_entity(entity, BehaviorId::new(3), None, TimerId::PRIMARY)
            .expect("register");

        let result = engine.send(&mut tape, PING, entity, entity, 0, Payload::None);
        assert_eq!(
            result,
            Err(EngineError::Configuration(
                ConfigurationError::UnboundBehavior {
                    entity,
                    behavior: BehaviorId::new(3),
                }
            ))
        );
    }

    #[test]
    fn send_to_out_of_range_recipient_is_a_configuration_error() {
        let mut engine = engine();
        let result = engine.send(
            &mut Tape::default(),
            PING,
            EntityId::new(0),
            EntityId::new(99),
            0,
            Payload::None,
        );
        assert!(matches!(
            result,
            Err(EngineError::Configuration(
                ConfigurationError::EntityOutOfRange { .. }
            ))
        ));
    }

    #[test]
    fn journal_is_only_recorded_under_apply() {
        let mut engine = engine();
        let mut tape = Tape::default();
        let mut events = Vec::new();
        engine.advance_timer(TimerId::PRIMARY, 5).expect("advance");

        apply(
            &mut engine,
            &mut tape,
            Command::AdvanceTimer {
                timer: TimerId::PRIMARY,
                ticks: 5,
            },
            &mut events,
        )
        .expect("advance");

        assert_eq!(
            events,
            vec![Event::TimerAdvanced {
                timer: TimerId::PRIMARY,
                now: 10,
            }]
        );
    }

    #[test]
    fn reset_keeps_behaviors_and_drops_everything_else() {
        let mut engine = engine();
        let mut tape = Tape::default();
        let entity = EntityId::new(4);
        engine
            .register_entity(entity, WORKER, None, TimerId::PRIMARY)
            .expect("register");
        engine
            .send(&mut tape, PING, entity, entity, 50, Payload::None)
            .expect("deferred");
        engine.advance_timer(TimerId::PRIMARY, 10).expect("advance");
        assert_eq!(engine.pending_len(), 1);

        engine.reset();

        assert_eq!(engine.pending_len(), 0);
        assert!(query::live_entities(&engine).is_empty());
        assert_eq!(query::timer_ticks(&engine, TimerId::PRIMARY), Some(0));
        assert!(matches!(
            engine.register_behavior(WORKER, recording),
            Err(ConfigurationError::DuplicateBehavior { .. })
        ));
    }

    #[test]
    fn debug_output_summarises_tables() {
        let engine = engine();
        let rendered = format!("{engine:?}");
        assert!(rendered.contains("bound_behaviors: 1"));
        assert!(rendered.contains("entity_capacity: 8"));
    }
}
