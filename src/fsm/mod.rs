//! Guarded-transition finite state machine engine.
//!
//! Classic embedded event-driven FSM pattern expressed in safe Rust:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  TransitionTable                                            │
//! │  ┌──────────┬───────────┬──────────┬─────────┬───────────┐  │
//! │  │ (from,ev) │ target    │ guard?   │ action? │           │  │
//! │  ├──────────┼───────────┼──────────┼─────────┼───────────┤  │
//! │  │ (Off, IgnOn)   → Initializing   [level ok]            │  │
//! │  │ (Running, LowCoolant) → Error                         │  │
//! │  │ ...                                                   │  │
//! │  └──────────┴───────────┴──────────┴─────────┴───────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is generic over the state enum `S`, the event enum `E`,
//! and a context type `C`. Every hook, guard, and action is a plain
//! `fn` pointer receiving the context — no closures, no `dyn`. All the
//! mutable state the callbacks need lives in `C`, threaded by `&mut`
//! through [`StateMachine::process_event`].
//!
//! The engine itself is not thread-safe; callers serialize
//! `process_event` (the supervisor does so under its own lock).

pub mod context;
pub mod states;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use log::{debug, info};

/// Entry/exit hook signature. Runs exactly once per transition.
pub type StateHookFn<C> = fn(&mut C);

/// Guard signature. A `false` return vetoes the transition with no
/// side effects.
pub type GuardFn<C, E> = fn(&C, E) -> bool;

/// Transition action signature. Runs after the exit hook, before the
/// state pointer moves.
pub type ActionFn<C, E> = fn(&mut C, E);

struct StateHooks<C> {
    on_enter: Option<StateHookFn<C>>,
    on_exit: Option<StateHookFn<C>>,
}

struct Transition<S, E, C> {
    target: S,
    guard: Option<GuardFn<C, E>>,
    action: Option<ActionFn<C, E>>,
}

/// The state machine engine.
pub struct StateMachine<S, E, C> {
    current: S,
    hooks: HashMap<S, StateHooks<C>>,
    transitions: HashMap<(S, E), Transition<S, E, C>>,
}

impl<S, E, C> StateMachine<S, E, C>
where
    S: Copy + Eq + Hash + Debug,
    E: Copy + Eq + Hash + Debug,
{
    /// Construct an empty machine resting in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            hooks: HashMap::new(),
            transitions: HashMap::new(),
        }
    }

    /// Register (or replace) the entry/exit hooks for a state.
    pub fn add_state(
        &mut self,
        state: S,
        on_enter: Option<StateHookFn<C>>,
        on_exit: Option<StateHookFn<C>>,
    ) {
        self.hooks.insert(state, StateHooks { on_enter, on_exit });
    }

    /// Register (or replace) a transition edge.
    pub fn add_transition(
        &mut self,
        from: S,
        event: E,
        target: S,
        guard: Option<GuardFn<C, E>>,
        action: Option<ActionFn<C, E>>,
    ) {
        self.transitions.insert(
            (from, event),
            Transition {
                target,
                guard,
                action,
            },
        );
    }

    /// Run the initial state's entry hook.
    /// Call once after construction, before the first event.
    pub fn start(&mut self, ctx: &mut C) {
        info!("FSM starting in state: {:?}", self.current);
        if let Some(enter) = self.hooks.get(&self.current).and_then(|h| h.on_enter) {
            enter(ctx);
        }
    }

    /// The current state.
    pub fn current_state(&self) -> S {
        self.current
    }

    /// Process one event against the transition table.
    ///
    /// Returns `false` when no edge matches the (current state, event)
    /// pair or the edge's guard vetoes it; the state and context are
    /// untouched in both cases. On a match: exit hook of the old state,
    /// transition action, state pointer update, entry hook of the new
    /// state, in that order, all on the caller's thread.
    pub fn process_event(&mut self, event: E, ctx: &mut C) -> bool {
        let Some(transition) = self.transitions.get(&(self.current, event)) else {
            debug!("FSM: no transition for {:?} in {:?}", event, self.current);
            return false;
        };

        if let Some(guard) = transition.guard {
            if !guard(ctx, event) {
                debug!("FSM: guard rejected {:?} in {:?}", event, self.current);
                return false;
            }
        }

        let target = transition.target;
        let action = transition.action;
        info!("FSM transition: {:?} -> {:?} on {:?}", self.current, target, event);

        if let Some(exit) = self.hooks.get(&self.current).and_then(|h| h.on_exit) {
            exit(ctx);
        }
        if let Some(action) = action {
            action(ctx, event);
        }
        self.current = target;
        if let Some(enter) = self.hooks.get(&self.current).and_then(|h| h.on_enter) {
            enter(ctx);
        }
        true
    }
}
