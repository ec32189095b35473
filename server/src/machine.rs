//! Transition engine that only accepts the currently legal move.
//!
//! A [`Machine`] is configured with one handler per input kind and an ordered
//! list of reactors. Every accepted input produces a fresh [`NextStates`] set,
//! the kinds of input that will be accepted next. An empty set is terminal.
//!
//! ## Handlers
//! A handler receives the session state, the per-request object and the input.
//! It either returns the new set of legal inputs or rejects the input with a
//! domain error. A rejection never changes the current set.
//!
//! ## Reactors
//! Reactors observe transitions after they are committed. Each one declares a
//! filter on the consumed input kind (`None` matches every kind) and a filter on
//! the resulting set (see [`Next`]). Matching reactors run in registration order
//! and the first failure stops the remaining ones. The transition itself stays
//! committed when a reactor fails.
//!
//! The engine is not internally synchronized. `change` takes `&mut self` and
//! `&mut S`, so whoever owns the machine is the single writer.

use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Inputs fed to a [`Machine`] expose a field-less kind used for dispatch.
pub trait Input {
    type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Set of input kinds legal as the next input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextStates<K>(Vec<K>);

impl<K: Copy + Eq> NextStates<K> {
    pub fn of(kinds: impl IntoIterator<Item = K>) -> Self {
        let mut set = Vec::new();
        for kind in kinds {
            if !set.contains(&kind) {
                set.push(kind);
            }
        }
        NextStates(set)
    }

    /// The terminal set; no further input is accepted.
    pub fn end() -> Self {
        NextStates(Vec::new())
    }

    pub fn contains(&self, kind: K) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_end(&self) -> bool {
        self.0.is_empty()
    }

    pub fn kinds(&self) -> &[K] {
        &self.0
    }
}

impl<K: fmt::Display> fmt::Display for NextStates<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kind)?;
        }
        f.write_str("}")
    }
}

/// Filter on the set produced by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next<K> {
    Any,
    /// Fires when the kind is among the next legal inputs.
    Kind(K),
    /// Fires when the transition was terminal.
    End,
}

impl<K: Copy + Eq> Next<K> {
    fn matches(&self, next: &NextStates<K>) -> bool {
        match self {
            Next::Any => true,
            Next::Kind(kind) => next.contains(*kind),
            Next::End => next.is_end(),
        }
    }
}

impl<K: fmt::Display> fmt::Display for Next<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Any => f.write_str("*"),
            Next::Kind(kind) => write!(f, "{}", kind),
            Next::End => f.write_str("end"),
        }
    }
}

fn prev_label<K: fmt::Display>(prev: &Option<K>) -> String {
    match prev {
        Some(kind) => kind.to_string(),
        None => "*".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MachineError<K, E>
where
    K: fmt::Debug + fmt::Display,
    E: std::error::Error + 'static,
{
    #[error("machine already started")]
    AlreadyStarted,
    #[error("machine not started")]
    NotStarted,
    #[error("{kind} is not allowed now, expected one of {expected}")]
    IllegalTransition { kind: K, expected: NextStates<K> },
    #[error("no handler registered for {0}")]
    Unhandled(K),
    #[error(transparent)]
    Rejected(E),
    #[error("reactor ({}, {next}) failed: {source}", prev_label(.prev))]
    Reactor {
        prev: Option<K>,
        next: Next<K>,
        source: E,
    },
}

type InitFn<S, K> = Box<dyn Fn(&S) -> NextStates<K> + Send + Sync>;
type HandlerFn<S, R, I, K, E> = Box<dyn Fn(&mut S, &mut R, &I) -> Result<NextStates<K>, E> + Send + Sync>;
type ReactFn<S, R, I, E> = Box<dyn Fn(&S, &R, &I) -> Result<(), E> + Send + Sync>;

struct Reactor<S, R, I, K, E> {
    prev: Option<K>,
    next: Next<K>,
    react: ReactFn<S, R, I, E>,
}

impl<S, R, I, K: Copy + Eq, E> Reactor<S, R, I, K, E> {
    fn fires(&self, prev: K, next: &NextStates<K>) -> bool {
        self.prev.map_or(true, |kind| kind == prev) && self.next.matches(next)
    }
}

pub struct Machine<S, R, I: Input, E> {
    init: InitFn<S, I::Kind>,
    handlers: HashMap<I::Kind, HandlerFn<S, R, I, I::Kind, E>>,
    reactors: Vec<Reactor<S, R, I, I::Kind, E>>,
    next: Option<NextStates<I::Kind>>,
}

impl<S, R, I, E> Machine<S, R, I, E>
where
    I: Input,
    E: std::error::Error + 'static,
{
    /// Creates a machine whose initial pseudo-state is computed by `init`.
    pub fn new(init: impl Fn(&S) -> NextStates<I::Kind> + Send + Sync + 'static) -> Self {
        Self {
            init: Box::new(init),
            handlers: HashMap::new(),
            reactors: Vec::new(),
            next: None,
        }
    }

    /// Registers the handler for one input kind, replacing any earlier one.
    pub fn on(
        mut self,
        kind: I::Kind,
        handler: impl Fn(&mut S, &mut R, &I) -> Result<NextStates<I::Kind>, E> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    /// Appends a reactor. Reactors run in the order they were added.
    pub fn react(
        mut self,
        prev: Option<I::Kind>,
        next: Next<I::Kind>,
        react: impl Fn(&S, &R, &I) -> Result<(), E> + Send + Sync + 'static,
    ) -> Self {
        self.reactors.push(Reactor {
            prev,
            next,
            react: Box::new(react),
        });
        self
    }

    pub fn start(&mut self, state: &S) -> Result<NextStates<I::Kind>, MachineError<I::Kind, E>> {
        if self.next.is_some() {
            return Err(MachineError::AlreadyStarted);
        }

        let next = (self.init)(state);
        debug!("Machine started, accepting {}", next);
        self.next = Some(next.clone());
        Ok(next)
    }

    /// Inputs accepted next, or `None` before [`Machine::start`].
    pub fn next_states(&self) -> Option<&NextStates<I::Kind>> {
        self.next.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.next.as_ref().is_some_and(NextStates::is_end)
    }

    /// Applies one input. On success the new set is committed before any
    /// reactor runs.
    pub fn change(
        &mut self,
        state: &mut S,
        request: &mut R,
        input: I,
    ) -> Result<NextStates<I::Kind>, MachineError<I::Kind, E>> {
        let kind = input.kind();
        let current = self.next.as_ref().ok_or(MachineError::NotStarted)?;

        if !current.contains(kind) {
            return Err(MachineError::IllegalTransition {
                kind,
                expected: current.clone(),
            });
        }

        let handler = self
            .handlers
            .get(&kind)
            .ok_or(MachineError::Unhandled(kind))?;
        let next = handler(state, request, &input).map_err(MachineError::Rejected)?;

        debug!("{} accepted, now accepting {}", kind, next);
        self.next = Some(next.clone());

        for reactor in self.reactors.iter().filter(|r| r.fires(kind, &next)) {
            (reactor.react)(&*state, &*request, &input).map_err(|source| MachineError::Reactor {
                prev: reactor.prev,
                next: reactor.next,
                source,
            })?;
        }

        Ok(next)
    }
}
