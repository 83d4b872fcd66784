use std::cell::{Cell, Ref, RefCell};
use std::collections::BTreeMap;

use log::trace;
use serde::{Deserialize, Serialize};
use tmh_core::errors::ErrorInfo;
use tmh_core::{Store, TmhError, Value};

use crate::effect::{Effect, EffectHandler, Flow};

/// Identifier of an effect handler registered with a [`Runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

/// Side-channel output accumulated by a program run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    entries: BTreeMap<String, Value>,
}

impl Query {
    /// Records `value` under `key`, replacing earlier output.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns the value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Drops all recorded output.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Execution environment shared by programs and handlers.
///
/// Holds the query side channel and the active-handler slot. Single-threaded:
/// interior mutability goes through `RefCell`/`Cell`, so a `Runtime` is
/// neither `Sync` nor reentrant across threads.
#[derive(Debug, Default)]
pub struct Runtime {
    query: RefCell<Query>,
    handlers: RefCell<Vec<HandlerId>>,
    next_id: Cell<u64>,
}

impl Runtime {
    /// Creates an environment with no active handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh handler identifier.
    pub fn register_handler(&self) -> HandlerId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        HandlerId(id)
    }

    /// Handler currently receiving effects, if any.
    pub fn active_handler(&self) -> Option<HandlerId> {
        self.handlers.borrow().last().copied()
    }

    /// Makes `id` the active handler until the returned scope is dropped.
    ///
    /// Installing a handler that is already on the handler stack is an
    /// invariant violation.
    pub fn install(&self, id: HandlerId) -> Result<HandlerScope<'_>, TmhError> {
        let mut handlers = self.handlers.borrow_mut();
        if handlers.contains(&id) {
            return Err(TmhError::Invariant(
                ErrorInfo::new("handler-reentry", "handler is already installed")
                    .with_context("handler", id.as_raw().to_string()),
            ));
        }
        let saved = handlers.last().copied();
        handlers.push(id);
        trace!("installed handler {} (saved {:?})", id.as_raw(), saved);
        Ok(HandlerScope {
            rt: self,
            id,
            saved,
        })
    }

    /// Read access to the query side channel.
    pub fn query(&self) -> Ref<'_, Query> {
        self.query.borrow()
    }

    /// Records a query entry on behalf of the running program.
    pub fn emit(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.query.borrow_mut().add(key, value);
    }

    /// Clears the query side channel before a re-execution.
    pub fn clear_query(&self) {
        self.query.borrow_mut().clear();
    }

    /// Builds the environment-level exit used to stop a partial execution.
    pub fn exit(&self, store: Store) -> Effect {
        Effect::Exit { store, value: None }
    }
}

/// Scoped installation of an effect handler.
///
/// Dropping the scope restores the handler that was active before
/// [`Runtime::install`], on every exit path including errors and unwinding.
#[derive(Debug)]
pub struct HandlerScope<'rt> {
    rt: &'rt Runtime,
    id: HandlerId,
    saved: Option<HandlerId>,
}

impl HandlerScope<'_> {
    /// Handler that was active before this scope, restored on drop.
    pub fn saved(&self) -> Option<HandlerId> {
        self.saved
    }

    /// Dispatches effects to `handler` until it reports [`Flow::Done`].
    ///
    /// Every effect is delivered only while this scope's handler is the
    /// active one; a scope installed on top of it and still alive makes the
    /// dispatch fail with `handler-not-active`.
    pub fn drive(&self, handler: &mut dyn EffectHandler, mut flow: Flow) -> Result<(), TmhError> {
        loop {
            let effect = match flow {
                Flow::Done => return Ok(()),
                Flow::Resume(effect) => effect,
            };
            self.ensure_active()?;
            trace!("dispatch {effect:?} to handler {}", self.id.as_raw());
            flow = match effect {
                Effect::Sample(site) => handler.sample(self.rt, site, false)?,
                Effect::Factor(site) => handler.factor(self.rt, site)?,
                Effect::Exit { store, value } => handler.exit(self.rt, store, value)?,
            };
        }
    }

    fn ensure_active(&self) -> Result<(), TmhError> {
        let active = self.rt.active_handler();
        if active == Some(self.id) {
            return Ok(());
        }
        Err(TmhError::Invariant(
            ErrorInfo::new("handler-not-active", "effect dispatched past the active handler")
                .with_context("handler", self.id.as_raw().to_string())
                .with_context(
                    "active",
                    active.map_or_else(|| "none".to_string(), |id| id.as_raw().to_string()),
                ),
        ))
    }
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        let mut handlers = self.rt.handlers.borrow_mut();
        if let Some(position) = handlers.iter().rposition(|id| *id == self.id) {
            handlers.truncate(position);
        }
        trace!(
            "restored handler {:?} after {}",
            self.saved,
            self.id.as_raw()
        );
    }
}
