// Typed, synchronous publish/subscribe for game notifications.
//
// Dispatch is single-threaded and depth-first: listeners run in registration
// order, and a listener may publish further events re-entrantly. The bus holds
// no entity state; the *default effect* of a cancellable event (apply damage,
// grant pickup, activate spawn) runs at the publish call site after the
// publisher inspects the cancel flag.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::domain::spawn::SpawnContent;
use crate::domain::state::{AmmoKind, Vec2};
use crate::domain::systems::flight::HitTarget;

/// Subscription key: one entry per event variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HitLanded,
    Shoot,
    ItemCollected,
    EntityDeath,
    SelectionChanged,
    SpawnOccurred,
    PauseToggled,
    ChatSent,
    PlayerRespawn,
}

/// Closed set of game notifications. Cancellable kinds carry a `cancelled`
/// flag any listener may set during dispatch; the other fields are immutable
/// by convention.
#[derive(Debug, Clone)]
pub enum GameEvent {
    HitLanded {
        shooter: u64,
        target: HitTarget,
        ammo_kind: AmmoKind,
        damage: i32,
        cancelled: bool,
    },
    Shoot {
        shooter: u64,
        origin: Vec2,
        direction: Vec2,
        ammo_kind: AmmoKind,
        cancelled: bool,
    },
    ItemCollected {
        collector: u64,
        slot: usize,
        content: SpawnContent,
        cancelled: bool,
    },
    EntityDeath {
        victim: HitTarget,
        killer: Option<u64>,
        cancelled: bool,
    },
    SelectionChanged {
        owner: u64,
        kind: Option<AmmoKind>,
    },
    SpawnOccurred {
        slot: usize,
        content: SpawnContent,
        cancelled: bool,
    },
    PauseToggled {
        paused: bool,
    },
    ChatSent {
        text: String,
        color: [u8; 3],
        cancelled: bool,
    },
    PlayerRespawn {
        player: u64,
        cancelled: bool,
    },
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::HitLanded { .. } => EventKind::HitLanded,
            GameEvent::Shoot { .. } => EventKind::Shoot,
            GameEvent::ItemCollected { .. } => EventKind::ItemCollected,
            GameEvent::EntityDeath { .. } => EventKind::EntityDeath,
            GameEvent::SelectionChanged { .. } => EventKind::SelectionChanged,
            GameEvent::SpawnOccurred { .. } => EventKind::SpawnOccurred,
            GameEvent::PauseToggled { .. } => EventKind::PauseToggled,
            GameEvent::ChatSent { .. } => EventKind::ChatSent,
            GameEvent::PlayerRespawn { .. } => EventKind::PlayerRespawn,
        }
    }

    /// Sets the cancel flag. Silently ignored on non-cancellable kinds.
    pub fn cancel(&mut self) {
        match self {
            GameEvent::HitLanded { cancelled, .. }
            | GameEvent::Shoot { cancelled, .. }
            | GameEvent::ItemCollected { cancelled, .. }
            | GameEvent::EntityDeath { cancelled, .. }
            | GameEvent::SpawnOccurred { cancelled, .. }
            | GameEvent::ChatSent { cancelled, .. }
            | GameEvent::PlayerRespawn { cancelled, .. } => *cancelled = true,
            GameEvent::SelectionChanged { .. } | GameEvent::PauseToggled { .. } => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            GameEvent::HitLanded { cancelled, .. }
            | GameEvent::Shoot { cancelled, .. }
            | GameEvent::ItemCollected { cancelled, .. }
            | GameEvent::EntityDeath { cancelled, .. }
            | GameEvent::SpawnOccurred { cancelled, .. }
            | GameEvent::ChatSent { cancelled, .. }
            | GameEvent::PlayerRespawn { cancelled, .. } => *cancelled,
            GameEvent::SelectionChanged { .. } | GameEvent::PauseToggled { .. } => false,
        }
    }
}

/// Ticket returned by `subscribe`; removing a listener requires it, so an
/// add/remove mix-up cannot leave a handler attached twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId {
    kind: EventKind,
    id: u64,
}

type ListenerFn = dyn FnMut(&mut GameEvent);

#[derive(Clone)]
struct Entry {
    id: u64,
    hook: Rc<RefCell<ListenerFn>>,
}

/// Single-threaded event dispatcher. Instances are plain values wired in at
/// construction; there is no process-wide singleton.
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<EventKind, Vec<Entry>>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        kind: EventKind,
        listener: impl FnMut(&mut GameEvent) + 'static,
    ) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().entry(kind).or_default().push(Entry {
            id,
            hook: Rc::new(RefCell::new(listener)),
        });
        ListenerId { kind, id }
    }

    /// Detaches a listener. Returns false when the id was already removed.
    pub fn unsubscribe(&self, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(entries) = listeners.get_mut(&listener.kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.id != listener.id);
        entries.len() != before
    }

    /// Dispatches to every listener of the event's kind, in registration
    /// order. Returns with the event's cancel flag reflecting what listeners
    /// decided; the caller then runs or skips the default effect.
    pub fn publish(&self, event: &mut GameEvent) {
        let kind = event.kind();
        // Snapshot the entry list so listeners can subscribe, unsubscribe,
        // and publish re-entrantly while dispatch is in flight.
        let snapshot: Vec<Entry> = self
            .listeners
            .borrow()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for entry in snapshot {
            let still_registered = self
                .listeners
                .borrow()
                .get(&kind)
                .is_some_and(|entries| entries.iter().any(|e| e.id == entry.id));
            if !still_registered {
                continue;
            }
            match entry.hook.try_borrow_mut() {
                Ok(mut hook) => hook(event),
                // The listener is already running further up the stack; a
                // same-kind republish from inside it is skipped instead of
                // recursing forever.
                Err(_) => trace!(?kind, "skipped re-entrant listener"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn chat(text: &str) -> GameEvent {
        GameEvent::ChatSent {
            text: text.to_string(),
            color: [255, 255, 255],
            cancelled: false,
        }
    }

    #[test]
    fn when_a_listener_cancels_then_the_flag_survives_dispatch() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::ChatSent, |ev| ev.cancel());

        let mut muted = chat("spam");
        bus.publish(&mut muted);
        assert!(muted.is_cancelled());

        // Same payload without the cancelling listener stays uncancelled.
        let bare_bus = EventBus::new();
        let mut allowed = chat("spam");
        bare_bus.publish(&mut allowed);
        assert!(!allowed.is_cancelled());
    }

    #[test]
    fn when_multiple_listeners_subscribe_then_they_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(EventKind::PauseToggled, move |_| {
                seen.borrow_mut().push(tag);
            });
        }

        bus.publish(&mut GameEvent::PauseToggled { paused: true });
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn when_unsubscribed_then_the_listener_no_longer_fires() {
        let bus = EventBus::new();
        let count = Rc::new(Cell::new(0u32));

        let counter = Rc::clone(&count);
        let id = bus.subscribe(EventKind::ChatSent, move |_| {
            counter.set(counter.get() + 1);
        });

        bus.publish(&mut chat("one"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&mut chat("two"));

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn when_cancel_is_called_on_a_non_cancellable_kind_then_it_is_ignored() {
        let mut ev = GameEvent::SelectionChanged {
            owner: 1,
            kind: Some(AmmoKind::Normal),
        };
        ev.cancel();
        assert!(!ev.is_cancelled());
    }

    #[test]
    fn when_a_listener_republishes_then_the_inner_dispatch_completes_first() {
        let bus = Rc::new(EventBus::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let order = Rc::clone(&order);
            bus.subscribe(EventKind::PauseToggled, move |_| {
                order.borrow_mut().push("pause");
            });
        }
        {
            let bus_inner = Rc::clone(&bus);
            let order = Rc::clone(&order);
            bus.subscribe(EventKind::ChatSent, move |_| {
                order.borrow_mut().push("chat-begin");
                bus_inner.publish(&mut GameEvent::PauseToggled { paused: true });
                order.borrow_mut().push("chat-end");
            });
        }

        bus.publish(&mut chat("nested"));
        assert_eq!(*order.borrow(), vec!["chat-begin", "pause", "chat-end"]);
    }

    #[test]
    fn when_a_listener_republishes_its_own_kind_then_it_is_not_re_entered() {
        let bus = Rc::new(EventBus::new());
        let calls = Rc::new(Cell::new(0u32));

        let bus_inner = Rc::clone(&bus);
        let counter = Rc::clone(&calls);
        bus.subscribe(EventKind::ChatSent, move |_| {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                bus_inner.publish(&mut GameEvent::ChatSent {
                    text: "echo".to_string(),
                    color: [0, 0, 0],
                    cancelled: false,
                });
            }
        });

        bus.publish(&mut chat("root"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn when_a_listener_unsubscribes_a_later_one_then_it_is_skipped_mid_dispatch() {
        let bus = Rc::new(EventBus::new());
        let late_ran = Rc::new(Cell::new(false));

        let slot: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));
        {
            let bus_inner = Rc::clone(&bus);
            let slot = Rc::clone(&slot);
            bus.subscribe(EventKind::ChatSent, move |_| {
                if let Some(id) = slot.take() {
                    bus_inner.unsubscribe(id);
                }
            });
        }
        let flag = Rc::clone(&late_ran);
        let late = bus.subscribe(EventKind::ChatSent, move |_| flag.set(true));
        slot.set(Some(late));

        bus.publish(&mut chat("prune"));
        assert!(!late_ran.get());
    }
}
