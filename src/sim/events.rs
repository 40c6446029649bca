//! Per-subsystem event dispatch
//!
//! Every subsystem owns one `Dispatcher` for its own event type. Handlers
//! registered with `on` see each event as it is emitted; the same event is
//! also kept in an outbox that the coordinator drains once per tick to fan
//! events out to other subsystems.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// An event with a discriminant used as the subscription key
pub trait SimEvent {
    type Kind: Copy + Eq + Hash + fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Handle returned by `Dispatcher::on`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

pub struct Dispatcher<E: SimEvent> {
    handlers: HashMap<E::Kind, Vec<(HandlerId, Handler<E>)>>,
    outbox: Vec<E>,
    next_handler: u64,
}

impl<E: SimEvent> Default for Dispatcher<E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            outbox: Vec::new(),
            next_handler: 0,
        }
    }
}

impl<E: SimEvent> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handler_count: usize = self.handlers.values().map(Vec::len).sum();
        f.debug_struct("Dispatcher")
            .field("handlers", &handler_count)
            .field("pending", &self.outbox.len())
            .finish()
    }
}

impl<E: SimEvent> Dispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event
    pub fn on(&mut self, kind: E::Kind, handler: impl FnMut(&E) + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not subscribed to `kind`.
    pub fn off(&mut self, kind: E::Kind, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        list.len() != before
    }

    /// Deliver to subscribers, then queue for the coordinator
    pub fn emit(&mut self, event: E) {
        if let Some(list) = self.handlers.get_mut(&event.kind()) {
            for (_, handler) in list.iter_mut() {
                handler(&event);
            }
        }
        self.outbox.push(event);
    }

    /// Take every event queued since the last drain
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.outbox)
    }

    /// Events queued since the last drain
    pub fn pending(&self) -> &[E] {
        &self.outbox
    }

    pub fn clear(&mut self) {
        self.outbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A(u32),
        B,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum PingKind {
        A,
        B,
    }

    impl SimEvent for Ping {
        type Kind = PingKind;

        fn kind(&self) -> PingKind {
            match self {
                Ping::A(_) => PingKind::A,
                Ping::B => PingKind::B,
            }
        }
    }

    #[test]
    fn test_handlers_receive_only_their_kind() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let sink = seen.clone();
        dispatcher.on(PingKind::A, move |e: &Ping| sink.borrow_mut().push(e.clone()));

        dispatcher.emit(Ping::A(1));
        dispatcher.emit(Ping::B);
        dispatcher.emit(Ping::A(2));

        assert_eq!(*seen.borrow(), vec![Ping::A(1), Ping::A(2)]);
        assert_eq!(dispatcher.drain(), vec![Ping::A(1), Ping::B, Ping::A(2)]);
        assert!(dispatcher.pending().is_empty());
    }

    #[test]
    fn test_off_unsubscribes() {
        let count = Rc::new(RefCell::new(0));
        let mut dispatcher = Dispatcher::new();
        let c = count.clone();
        let id = dispatcher.on(PingKind::B, move |_: &Ping| *c.borrow_mut() += 1);

        dispatcher.emit(Ping::B);
        assert!(dispatcher.off(PingKind::B, id));
        assert!(!dispatcher.off(PingKind::B, id));
        dispatcher.emit(Ping::B);

        assert_eq!(*count.borrow(), 1);
    }
}
