use std::fmt;
use std::rc::Rc;

use tmh_core::{Address, Erp, Store, TmhError, Value};

use crate::runtime::Runtime;

/// Rest of the program after a random choice, resumed with `(store, value)`.
pub type SampleCont = Rc<dyn Fn(&Runtime, Store, Value) -> Result<Effect, TmhError>>;

/// Rest of the program after a factor, resumed with `store`.
pub type FactorCont = Rc<dyn Fn(&Runtime, Store) -> Result<Effect, TmhError>>;

/// Request issued by a random choice point.
#[derive(Clone)]
pub struct SampleSite {
    /// Program state at the choice point.
    pub store: Store,
    /// Continuation receiving the chosen value.
    pub k: SampleCont,
    /// Stable address of the choice.
    pub address: Address,
    /// Distribution to draw from.
    pub erp: Rc<dyn Erp>,
    /// Arguments to the distribution.
    pub params: Vec<Value>,
}

/// Request issued by a conditioning point.
#[derive(Clone)]
pub struct FactorSite {
    /// Program state at the factor.
    pub store: Store,
    /// Continuation resumed after weighting.
    pub k: FactorCont,
    /// Stable address of the factor.
    pub address: Address,
    /// Log weight contributed to the trace score.
    pub weight: f64,
}

/// Effects a running program delivers to the active handler.
#[derive(Clone)]
pub enum Effect {
    /// A random choice.
    Sample(SampleSite),
    /// A soft constraint.
    Factor(FactorSite),
    /// Program completion. `value` is `None` when the environment stops the
    /// program early (partial execution up to an exit address).
    Exit {
        /// Program state at exit.
        store: Store,
        /// Return value of the program, if it ran to completion.
        value: Option<Value>,
    },
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Sample(site) => f
                .debug_struct("Sample")
                .field("address", &site.address)
                .field("erp", &site.erp.name())
                .field("params", &site.params)
                .finish_non_exhaustive(),
            Effect::Factor(site) => f
                .debug_struct("Factor")
                .field("address", &site.address)
                .field("weight", &site.weight)
                .finish_non_exhaustive(),
            Effect::Exit { value, .. } => f.debug_struct("Exit").field("value", value).finish(),
        }
    }
}

/// What the driver should do after a handler processed an effect.
#[derive(Debug)]
pub enum Flow {
    /// Keep dispatching with the next effect produced by the program.
    Resume(Effect),
    /// The handler reached a terminal outcome; stop re-execution.
    Done,
}

/// Handler for the three program effects. One method per effect variant.
pub trait EffectHandler {
    /// Resolves a random choice. `forced` marks the single choice a kernel
    /// deliberately resamples.
    fn sample(&mut self, rt: &Runtime, site: SampleSite, forced: bool) -> Result<Flow, TmhError>;

    /// Applies a soft constraint.
    fn factor(&mut self, rt: &Runtime, site: FactorSite) -> Result<Flow, TmhError>;

    /// Handles program exit.
    fn exit(&mut self, rt: &Runtime, store: Store, value: Option<Value>)
        -> Result<Flow, TmhError>;
}

/// Builds a sample effect.
pub fn sample<F>(
    store: Store,
    address: impl Into<Address>,
    erp: Rc<dyn Erp>,
    params: Vec<Value>,
    k: F,
) -> Effect
where
    F: Fn(&Runtime, Store, Value) -> Result<Effect, TmhError> + 'static,
{
    Effect::Sample(SampleSite {
        store,
        k: Rc::new(k),
        address: address.into(),
        erp,
        params,
    })
}

/// Builds a factor effect.
pub fn factor<F>(store: Store, address: impl Into<Address>, weight: f64, k: F) -> Effect
where
    F: Fn(&Runtime, Store) -> Result<Effect, TmhError> + 'static,
{
    Effect::Factor(FactorSite {
        store,
        k: Rc::new(k),
        address: address.into(),
        weight,
    })
}

/// Builds the natural program-exit effect.
pub fn exit(store: Store, value: impl Into<Value>) -> Effect {
    Effect::Exit {
        store,
        value: Some(value.into()),
    }
}

/// Entry point of a program under inference.
#[derive(Clone)]
pub struct Program {
    entry: FactorCont,
}

impl Program {
    /// Wraps the entry continuation of a program.
    pub fn new<F>(entry: F) -> Self
    where
        F: Fn(&Runtime, Store) -> Result<Effect, TmhError> + 'static,
    {
        Self {
            entry: Rc::new(entry),
        }
    }

    /// Runs the program from its entry until its first effect.
    pub fn start(&self, rt: &Runtime) -> Result<Effect, TmhError> {
        (self.entry)(rt, Store::new())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program").finish_non_exhaustive()
    }
}
