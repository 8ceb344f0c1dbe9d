//! Holding area for messages whose due tick has not been reached.

use std::collections::VecDeque;

use fsm_relay_core::{EntityId, Message, Tick};

/// Messages partitioned by a single sweep of the queue.
#[derive(Debug, Default)]
pub(crate) struct Sweep {
    /// Due messages whose recipient is registered, in insertion order.
    pub(crate) ready: Vec<Message>,
    /// Messages whose recipient is no longer registered.
    pub(crate) orphaned: Vec<Message>,
}

/// Insertion-ordered queue of deferred messages.
#[derive(Clone, Debug, Default)]
pub(crate) struct DeferredQueue {
    pending: VecDeque<Message>,
}

impl DeferredQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, message: Message) {
        self.pending.push_back(message);
    }

    /// Removes every due or orphaned message in a single pass.
    ///
    /// `now` reports the current reading of the recipient's timer, or `None`
    /// when the recipient is not registered. Messages that are not yet due
    /// keep their relative order.
    pub(crate) fn collect_ready(&mut self, now: impl Fn(EntityId) -> Option<Tick>) -> Sweep {
        let mut sweep = Sweep::default();
        let mut waiting = VecDeque::with_capacity(self.pending.len());

        for message in self.pending.drain(..) {
            match now(message.to) {
                None => sweep.orphaned.push(message),
                Some(tick) if message.due_tick <= tick => sweep.ready.push(message),
                Some(_) => waiting.push_back(message),
            }
        }

        self.pending = waiting;
        sweep
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Message> {
        self.pending.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
