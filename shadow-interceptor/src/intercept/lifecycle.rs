//! Per-call state machine and event dispatch for event-driven adapters.
//!
//! Nothing here knows about a particular host API; an adapter owns one
//! [`CallLifecycle`] and one [`EventDispatcher`] per call and drives them.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unsent,
    Opened,
    Sent,
    Matched,
    Responding,
    Done,
    Failed,
    /// Handed to the host transport; its own states apply from here.
    Delegated,
}

impl CallState {
    /// `Opened` is reachable from every state a caller can observe between
    /// calls; reopening starts a fresh call.
    pub fn can_transition(self, to: CallState) -> bool {
        use CallState::*;
        matches!(
            (self, to),
            (Unsent | Opened | Done | Failed | Delegated, Opened)
                | (Opened, Sent)
                | (Sent, Matched)
                | (Sent, Delegated)
                | (Matched, Responding)
                | (Matched, Failed)
                | (Responding, Done)
                | (Responding, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Done | CallState::Failed)
    }

    /// XHR-style numeric ready state (0 unsent, 1 opened, 4 done).
    pub fn ready_state(self) -> u16 {
        match self {
            CallState::Unsent => 0,
            CallState::Opened
            | CallState::Sent
            | CallState::Matched
            | CallState::Responding
            | CallState::Delegated => 1,
            CallState::Done | CallState::Failed => 4,
        }
    }

    /// Events fired on entering this state, in order.
    pub fn entry_events(self) -> &'static [LifecycleEvent] {
        match self {
            CallState::Done => &[
                LifecycleEvent::ReadyStateChange,
                LifecycleEvent::Load,
                LifecycleEvent::LoadEnd,
            ],
            CallState::Failed => &[LifecycleEvent::ReadyStateChange, LifecycleEvent::Error],
            _ => &[],
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid call transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: CallState,
    pub to: CallState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    ReadyStateChange,
    Load,
    LoadEnd,
    Error,
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::ReadyStateChange => "readystatechange",
            LifecycleEvent::Load => "load",
            LifecycleEvent::LoadEnd => "loadend",
            LifecycleEvent::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of the call as observed by a listener when an event fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub event: LifecycleEvent,
    pub ready_state: u16,
    pub status: u16,
    pub response_text: String,
}

#[derive(Debug)]
pub struct CallLifecycle {
    state: CallState,
}

impl Default for CallLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl CallLifecycle {
    pub fn new() -> Self {
        Self {
            state: CallState::Unsent,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn advance(&mut self, to: CallState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::trace!(from = ?self.state, to = ?to, "call transition");
        self.state = to;
        Ok(())
    }
}

pub type Listener = Box<dyn FnMut(&EventSnapshot) + Send>;

/// Assignable `on<event>` hooks plus added listeners.
///
/// For one event the hook runs first, then listeners in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    on_readystatechange: Option<Listener>,
    on_load: Option<Listener>,
    on_loadend: Option<Listener>,
    on_error: Option<Listener>,
    listeners: Vec<(LifecycleEvent, Listener)>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hook(&mut self, event: LifecycleEvent, hook: Option<Listener>) {
        *self.hook_slot(event) = hook;
    }

    pub fn add_listener(&mut self, event: LifecycleEvent, listener: Listener) {
        self.listeners.push((event, listener));
    }

    pub fn dispatch(&mut self, snapshot: &EventSnapshot) {
        if let Some(hook) = self.hook_slot(snapshot.event).as_mut() {
            hook(snapshot);
        }
        for (event, listener) in self.listeners.iter_mut() {
            if *event == snapshot.event {
                listener(snapshot);
            }
        }
    }

    fn hook_slot(&mut self, event: LifecycleEvent) -> &mut Option<Listener> {
        match event {
            LifecycleEvent::ReadyStateChange => &mut self.on_readystatechange,
            LifecycleEvent::Load => &mut self.on_load,
            LifecycleEvent::LoadEnd => &mut self.on_loadend,
            LifecycleEvent::Error => &mut self.on_error,
        }
    }
}
